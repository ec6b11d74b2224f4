//! Credguard evidence chain.
//!
//! An append-only ledger of compliance events. Every entry names its
//! predecessor, carries `H(id ‖ previous_id)` as its chain hash and is signed
//! with the chain's Ed25519 key over a canonical encoding of all its fields.
//! Reordering, splicing or editing any entry is detected by
//! [`ChainVerifier::verify_chain`], which needs only the public key and so runs
//! identically inside the process and against an exported [`ChainExport`].
//!
//! Credential identifiers reach the chain only as one-way hashes; see
//! [`NewEvidence::with_credential_id`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
pub mod signer;
mod traits;

pub use error::{EvidenceError, EvidenceResult};
pub use memory::InMemoryEvidenceChain;
pub use model::{ChainExport, ChainVerification, ExportFilter, NewEvidence};
pub use signer::{canonical_string, compute_chain_hash, ChainVerifier, EvidenceSigner};
pub use traits::EvidenceLedger;
