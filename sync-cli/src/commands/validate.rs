//! Validate a public key offline.

use anyhow::{Context, Result};
use relaysync_core::{validate_pubkey, PubkeyForms};

/// Run the validate command.
pub fn run(input: &str) -> Result<()> {
    let forms = check(input)?;
    println!("hex:  {}", forms.hex);
    println!("npub: {}", forms.npub);
    Ok(())
}

fn check(input: &str) -> Result<PubkeyForms> {
    validate_pubkey(input).context("invalid public key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_npub() {
        let forms =
            check("npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg").unwrap();
        assert_eq!(
            forms.hex,
            "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e"
        );
    }

    #[test]
    fn error_chain_keeps_cause() {
        let err = check("alice@example.com").unwrap_err();
        assert_eq!(err.to_string(), "invalid public key");
        assert!(format!("{err:#}").contains("expected npub or 64-character hex"));
    }
}
