//! `bale cert` - Signing certificates and the trust store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bale_core::cert::CertificateRequest;
use bale_core::crypto::keys::{generate_signing_key, load_private_key_pem, private_key_to_pem};
use bale_core::Certificate;
use chrono::Duration;
use clap::{Args, Subcommand};
use ed25519_dalek::SigningKey;

use super::open_trust_store;
use crate::cli::args::CertArgs;
use crate::exit_codes;

#[derive(Subcommand, Debug)]
pub enum CertCmd {
    /// Generate a key and a certificate for SUBJECT
    Build(CertBuildArgs),
    /// Re-issue a certificate signed by an issuer
    Sign(CertSignArgs),
    /// Trust one or more certificates
    Add(CertAddArgs),
    /// List trusted certificates
    List(CertListArgs),
    /// Remove a trusted certificate by fingerprint
    Remove(CertRemoveArgs),
}

#[derive(Args, Debug)]
pub struct IssuerArgs {
    /// Issuer certificate; self-signed when omitted
    #[arg(long, requires = "issuer_key")]
    pub issuer_cert: Option<PathBuf>,

    /// Issuer private key (PKCS#8 PEM)
    #[arg(long, requires = "issuer_cert")]
    pub issuer_key: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CertBuildArgs {
    /// Certificate subject, usually an email address
    pub subject: String,

    /// Output directory for private_key.pem and public_cert.json
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Validity in days
    #[arg(long, default_value_t = 365)]
    pub days: i64,

    /// Allow the certificate to issue others
    #[arg(long)]
    pub ca: bool,

    #[command(flatten)]
    pub issuer: IssuerArgs,

    /// Force overwrite existing files
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CertSignArgs {
    /// Certificate to re-issue
    pub cert: PathBuf,

    /// Issuer certificate
    #[arg(long)]
    pub issuer_cert: PathBuf,

    /// Issuer private key (PKCS#8 PEM)
    #[arg(long)]
    pub issuer_key: PathBuf,

    /// Validity in days
    #[arg(long, default_value_t = 365)]
    pub days: i64,

    /// Write here instead of replacing CERT
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CertAddArgs {
    #[arg(required = true, value_name = "CERT")]
    pub certs: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CertListArgs {
    /// Only show subjects containing this text
    pub filter: Option<String>,
}

#[derive(Args, Debug)]
pub struct CertRemoveArgs {
    /// `sha256:<hex>` or bare hex
    pub fingerprint: String,
}

pub fn cmd_cert(args: CertArgs) -> i32 {
    let trust_dir = args.trust_dir;
    let result = match args.cmd {
        CertCmd::Build(a) => run_build(a),
        CertCmd::Sign(a) => run_sign(a),
        CertCmd::Add(a) => run_add(a, trust_dir),
        CertCmd::List(a) => run_list(a, trust_dir),
        CertCmd::Remove(a) => run_remove(a, trust_dir),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR:  {e:#}");
            exit_codes::SIGNING_ERROR
        }
    }
}

fn load_issuer(cert: &Path, key: &Path) -> Result<(Certificate, SigningKey)> {
    let issuer = Certificate::load(cert)?;
    let issuer_key = load_private_key_pem(key)?;
    Ok((issuer, issuer_key))
}

fn run_build(args: CertBuildArgs) -> Result<i32> {
    if args.days <= 0 {
        anyhow::bail!("--days must be positive, got {}", args.days);
    }
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create directory: {}", args.out.display()))?;

    let key_path = args.out.join("private_key.pem");
    let cert_path = args.out.join("public_cert.json");
    if !args.force {
        for path in [&key_path, &cert_path] {
            if path.exists() {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
        }
    }

    let key = generate_signing_key();
    let request = CertificateRequest::new(&args.subject, key.verifying_key())
        .valid_for(Duration::days(args.days))
        .ca(args.ca);
    let cert = match (&args.issuer.issuer_cert, &args.issuer.issuer_key) {
        (Some(cert), Some(issuer_key)) => {
            let (issuer, issuer_key) = load_issuer(cert, issuer_key)?;
            request.sign_with(&issuer, &issuer_key)?
        }
        _ => request.self_sign(&key)?,
    };

    let pem = private_key_to_pem(&key)?;
    fs::write(&key_path, pem.as_bytes())
        .with_context(|| format!("failed to write private key: {}", key_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on: {}", key_path.display()))?;
    }
    fs::write(&cert_path, cert.to_json_pretty()?)
        .with_context(|| format!("failed to write certificate: {}", cert_path.display()))?;

    println!("Certificate: {}", cert_path.display());
    println!("Private Key: {}", key_path.display());
    println!("Fingerprint: {}", cert.fingerprint()?);
    println!();
    println!("Don't forget to move the key file to somewhere private!");
    Ok(exit_codes::SUCCESS)
}

fn run_sign(args: CertSignArgs) -> Result<i32> {
    if args.days <= 0 {
        anyhow::bail!("--days must be positive, got {}", args.days);
    }
    let cert = Certificate::load(&args.cert)?;
    let (issuer, issuer_key) = load_issuer(&args.issuer_cert, &args.issuer_key)?;

    let signed = CertificateRequest::new(&cert.subject, cert.public_key()?)
        .valid_for(Duration::days(args.days))
        .ca(cert.is_ca)
        .sign_with(&issuer, &issuer_key)?;

    let out = args.out.unwrap_or(args.cert);
    fs::write(&out, signed.to_json_pretty()?)
        .with_context(|| format!("failed to write certificate: {}", out.display()))?;
    println!("Signed '{}' with '{}'", signed.subject, issuer.subject);
    println!("Fingerprint: {}", signed.fingerprint()?);
    Ok(exit_codes::SUCCESS)
}

fn run_add(args: CertAddArgs, trust_dir: Option<PathBuf>) -> Result<i32> {
    let store = match open_trust_store(trust_dir) {
        Ok(store) => store,
        Err(e) => return Ok(trust_failure(e)),
    };
    for path in &args.certs {
        let cert = Certificate::load(path)?;
        match store.trust(&cert) {
            Ok(true) => println!("Added '{}'", cert.subject),
            Ok(false) => println!("Already trusted '{}'", cert.subject),
            Err(e) => return Ok(trust_failure(e)),
        }
    }
    Ok(exit_codes::SUCCESS)
}

fn run_list(args: CertListArgs, trust_dir: Option<PathBuf>) -> Result<i32> {
    let store = match open_trust_store(trust_dir) {
        Ok(store) => store,
        Err(e) => return Ok(trust_failure(e)),
    };
    let certs = match store.list() {
        Ok(certs) => certs,
        Err(e) => return Ok(trust_failure(e)),
    };
    for cert in certs {
        if let Some(filter) = &args.filter {
            if !cert.subject.contains(filter.as_str()) {
                continue;
            }
        }
        println!(
            "{}  {}  (expires {})",
            cert.subject,
            cert.fingerprint()?,
            cert.not_after.format("%Y-%m-%d")
        );
    }
    Ok(exit_codes::SUCCESS)
}

fn run_remove(args: CertRemoveArgs, trust_dir: Option<PathBuf>) -> Result<i32> {
    let store = match open_trust_store(trust_dir) {
        Ok(store) => store,
        Err(e) => return Ok(trust_failure(e)),
    };
    match store.remove(&args.fingerprint) {
        Ok(true) => {
            println!("Removed {}", args.fingerprint);
            Ok(exit_codes::SUCCESS)
        }
        Ok(false) => {
            eprintln!(
                "ERROR:  No trusted certificate with fingerprint {}",
                args.fingerprint
            );
            Ok(exit_codes::TRUST_ERROR)
        }
        Err(e) => Ok(trust_failure(e)),
    }
}

fn trust_failure(e: impl Into<anyhow::Error>) -> i32 {
    let e = e.into();
    eprintln!("ERROR:  {e:#}");
    exit_codes::TRUST_ERROR
}
