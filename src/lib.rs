//! PicoCA - a tiny local certificate authority
//!
//! This library holds one root identity and issues leaf certificates for
//! hostnames and IP addresses, suitable for development and self-hosted TLS:
//!
//! - Loading a persisted root, or bootstrapping a new P-384 root
//! - Issuing P-256 leaf certificates with SANs valid for both server and client auth
//! - Inspecting certificates and verifying them against the root
//!
//! # Examples
//!
//! ## Bootstrapping a root and issuing a certificate
//!
//! ```no_run
//! use picoca::store::CertStore;
//!
//! let store = CertStore::new("certificates");
//! let ca = store.load_or_bootstrap_root().unwrap();
//! if ca.is_bootstrapped() {
//!     store.save_root(&ca).unwrap();
//! }
//!
//! let issued = ca.issue(["example.test", "127.0.0.1"], 366).unwrap();
//! store.save_leaf("example.test", &issued).unwrap();
//! ```
//!
//! ## Building and signing a template by hand
//!
//! ```no_run
//! use picoca::ca::CertificateAuthority;
//! use picoca::cert::CertificateBuilder;
//! use picoca::keys::{generate_key, PublicKey};
//! use picoca::types::KeyCurve;
//!
//! let ca = CertificateAuthority::bootstrap().unwrap();
//! let key = generate_key(KeyCurve::P384).unwrap();
//! let public_key = PublicKey::from_key_pair(&key).unwrap();
//!
//! let builder = CertificateBuilder::leaf(["api.example.test"]).with_lifespan_days(30);
//! let template = ca.construct(&public_key, &builder).unwrap();
//! let signed = ca.sign(template, None).unwrap();
//! println!("{}", signed.pem());
//! ```
//!
//! ## Verifying a leaf
//!
//! ```no_run
//! use picoca::cert::SignedCertificate;
//! use picoca::verify::{verify_leaf, Purpose};
//!
//! let root = SignedCertificate::from_pem(&std::fs::read_to_string("certificates/__root__.pem").unwrap()).unwrap();
//! let leaf = SignedCertificate::from_pem(&std::fs::read_to_string("certificates/example.test.pem").unwrap()).unwrap();
//! verify_leaf(&root, &leaf, "example.test", Purpose::ServerAuth).unwrap();
//! ```

pub mod ca;
pub mod cert;
pub mod error;
pub mod inspect;
pub mod keys;
pub mod store;
pub mod types;
pub mod verify;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod logging;

pub use error::{Error, Result};

pub use ca::{CertificateAuthority, IssuedCertificate, RootOrigin};
pub use cert::{CertificateBuilder, CertificateTemplate, SignedCertificate};
pub use inspect::CertificateInfo;
pub use keys::PublicKey;
pub use store::CertStore;
pub use types::{KeyCurve, Role, SanEntry, SignatureDigest, SubjectName};
pub use verify::{verify_leaf, Purpose};
