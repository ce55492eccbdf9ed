pub mod alias;
pub mod catalog;
pub mod downloader;
pub mod inspector;
pub mod integrity;
pub mod reconciler;
pub mod staging;

pub use alias::{AliasOutcome, AliasReport, AliasResolver};
pub use catalog::{
    AliasSpec, Catalog, ComponentSpec, Feature, PDF_EXTRACT_KIT_ALIASES, PDF_EXTRACT_KIT_COMPONENTS,
};
pub use downloader::{ArtifactFetcher, FetchResult, HfRegistryClient};
pub use inspector::{ComponentPresence, LayoutInspector};
pub use integrity::{IntegrityStatus, IntegrityVerifier};
pub use reconciler::{LayoutReconciler, ReconcileOutcome, ReconcileReport};
pub use staging::{MergeReport, StagingSession};
