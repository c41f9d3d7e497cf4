//! KILN Providers - Uniform contracts over heterogeneous backends
//!
//! Each provider family has one contract; each backend implements it:
//!
//! - **Runtime**: Lambda, Cloud Run, Kubernetes, Vercel, Cloud Functions,
//!   Cloudflare Workers, Local, Docker Compose
//! - **IaC**: Pulumi, CloudFormation, Docker Compose
//! - **Secret**: Vault, AWS Secrets Manager, GCP Secret Manager, dotenv
//! - **GitOps**: Argo CD, Flux
//! - **Toolchain**: per-language capability discovery
//!
//! Dispatch goes through an explicit [`ProviderRegistry`] - a table from
//! (family, backend name) to provider object, populated at startup.
//!
//! ## Key Principle
//!
//! Provider operations never raise for domain outcomes; they return tagged
//! variants (`DeployOutcome::ImagePullBackOff`, not an error). The executor
//! maps variants to its own retry/rollback policy. Every backend owns its
//! own relation in the record store and keeps its state transitions atomic
//! per (relation, id).

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod artifact;
pub mod emitter;
pub mod gitops;
pub mod iac;
pub mod registry;
pub mod runtime;
pub mod secret;
pub mod toolchain;

// Re-exports
pub use artifact::{ArtifactCache, BuildOutcome, GcOutcome, StoreOutcome, TestReport};
pub use emitter::{Emitter, NullEmitter, RecordingEmitter, WrittenFile};
pub use gitops::{EmittedManifests, GitOpsProvider, ReconcileOutcome};
pub use iac::{ApplyOutcome, GeneratedStack, IacProvider, PreviewOutcome, TeardownOutcome};
pub use registry::ProviderRegistry;
pub use runtime::{
    schemas_compatible, DeployOutcome, DestroyOutcome, HealthOutcome, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome,
};
pub use secret::{FetchOutcome, RenewOutcome, RotateOutcome, SecretProvider};
pub use toolchain::{Registration, ResolveOutcome, StubToolchain, Toolchain, ToolchainRegistry};
