//! `bale verify` - Check an archive against the trust store.

use bale_core::{BaleError, Verifier};

use super::load_config;
use crate::cli::args::VerifyArgs;
use crate::exit_codes;

pub fn run(args: VerifyArgs) -> anyhow::Result<i32> {
    let mut config = load_config(args.trust_dir);
    if let Some(policy) = args.policy {
        config = config.with_security_policy(policy);
    }

    let store = match config.open_trust_store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("ERROR:  {e:#}");
            return Ok(exit_codes::TRUST_ERROR);
        }
    };

    let report = match Verifier::new(&store, config.security_policy).verify_report(&args.archive) {
        Ok(report) => report,
        Err(e) => {
            let e = BaleError::from(e);
            eprintln!("ERROR:  {e}");
            return Ok(e.exit_code());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.verified {
        println!("Verified {} ({} policy)", args.archive.display(), report.policy);
        if let Some(signer) = &report.signer {
            println!("  Signer: {signer}");
        }
        println!("  Digest: {}", report.digest);
    }
    for note in &report.notes {
        eprintln!("NOTE:  {note}");
    }

    if report.verified {
        Ok(exit_codes::SUCCESS)
    } else {
        if let Some(failure) = &report.failure {
            eprintln!(
                "ERROR:  {} failed verification: {failure}",
                args.archive.display()
            );
        }
        Ok(exit_codes::NOT_VERIFIED)
    }
}
