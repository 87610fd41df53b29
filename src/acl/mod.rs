//! ACL engine: permission model, access resolution, filter merging, field projection,
//! reference composition and the per-operation gatekeeper.

pub mod model;
pub mod resolver;
pub mod filter;
pub mod projection;
pub mod compose;
pub mod gatekeeper;

pub use model::{
    collection_key, AccessDecision, Action, ActionPermission, DescriptorError, Document, PermissionDescriptor, Query,
    ID_FIELD,
};
pub use resolver::{resolve, resolve_descriptor, Ownership};
pub use filter::{combine, combine_all};
pub use projection::{merge, project, project_many, strip, FieldProjection, ProjectionMode};
pub use compose::Composer;
pub use gatekeeper::{Gatekeeper, Metadata, Operation, OperationOutcome, OperationRequest};
