//! Print the `x-signature` header for a webhook body.
//!
//! Usage: `sign-webhook <payload.json> [secret]`. The secret falls back to
//! `WEBHOOK_SECRET`. Pass `-` to read the payload from stdin.

use std::io::Read;

use anyhow::{Context, Result, bail};
use coria_backend::domain::signature::{canonical_json, sign};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let Some(path) = args.first() else {
        bail!("usage: sign-webhook <payload.json|-> [secret]");
    };

    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read payload from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?
    };

    let payload: serde_json::Value =
        serde_json::from_str(&raw).context("Payload is not valid JSON")?;

    let secret = match args.get(1) {
        Some(secret) => secret.clone(),
        None => std::env::var("WEBHOOK_SECRET")
            .context("No secret given and WEBHOOK_SECRET is not set")?,
    };

    eprintln!("canonical: {}", canonical_json(&payload));
    println!("{}", sign(&payload, secret.as_bytes()));
    Ok(())
}
