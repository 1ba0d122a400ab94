//! Resolve an npub, hex key or NIP-05 identifier.

use anyhow::{Context, Result};
use relaysync_client::{resolve_identity, ClientConfig, Nip05Resolver, ResolvedIdentity};
use serde_json::json;

/// Run the resolve command.
pub async fn run(input: &str, client_config: &ClientConfig, as_json: bool) -> Result<()> {
    let resolver =
        Nip05Resolver::new(client_config).context("failed to build NIP-05 resolver")?;
    let identity = resolve_identity(input, &resolver)
        .await
        .with_context(|| format!("failed to resolve {}", input.trim()))?;

    if as_json {
        println!("{}", to_json(&identity));
    } else {
        print!("{}", to_text(&identity));
    }
    Ok(())
}

fn to_json(identity: &ResolvedIdentity) -> serde_json::Value {
    json!({
        "hex": identity.hex,
        "npub": identity.npub,
        "source": identity.source.to_string(),
        "nip05": identity.nip05,
        "relays": identity.relays,
    })
}

fn to_text(identity: &ResolvedIdentity) -> String {
    let mut out = format!(
        "hex:    {}\nnpub:   {}\nsource: {}\n",
        identity.hex, identity.npub, identity.source
    );
    if let Some(nip05) = &identity.nip05 {
        out.push_str(&format!("nip05:  {nip05}\n"));
    }
    for relay in &identity.relays {
        out.push_str(&format!("relay:  {relay}\n"));
    }
    out
}
