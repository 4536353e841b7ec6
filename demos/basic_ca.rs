use picoca::cert::CertificateBuilder;
use picoca::keys::{generate_key, PublicKey};
use picoca::store::CertStore;
use picoca::types::KeyCurve;
use picoca::verify::{verify_leaf, Purpose};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = CertStore::new("demo-certificates");

    println!("Loading or creating the root CA...");
    let ca = store.load_or_bootstrap_root()?;
    if ca.is_bootstrapped() {
        let dir = store.save_root(&ca)?;
        println!("Root CA created and saved to {}", dir.display());
    }

    println!("\nIssuing a certificate for localhost...");
    let issued = ca.issue(["localhost", "127.0.0.1", "::1"], 90)?;
    let (cert_path, key_path) = store.save_leaf("localhost", &issued)?;
    verify_leaf(ca.certificate(), &issued.certificate, "127.0.0.1", Purpose::ServerAuth)?;
    println!("Certificate issued and verified!");

    println!("\nSigning a P-384 key by hand...");
    let key = generate_key(KeyCurve::P384)?;
    let public_key = PublicKey::from_key_pair(&key)?;
    let builder = CertificateBuilder::leaf(["internal.example.test"])
        .with_common_name("Internal Service")
        .with_lifespan_days(30);
    let template = ca.construct(&public_key, &builder)?;
    let signed = ca.sign(template, None)?;
    println!("Signed with {}", signed.digest().name());

    println!("\nFiles created:");
    println!("  - {}", cert_path.display());
    println!("  - {}", key_path.display());

    Ok(())
}
