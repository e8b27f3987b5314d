use duet::ledger::codec::decode_snapshot;
use duet::types::ConversationId;

/// Decode a snapshot offline and print it as JSON
pub fn execute(hex_bytes: &str, conversation: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render(hex_bytes, conversation)?);
    Ok(())
}

pub fn render(hex_bytes: &str, conversation: &str) -> Result<String, Box<dyn std::error::Error>> {
    let trimmed = hex_bytes.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits)?;

    let envelope = decode_snapshot(&ConversationId::new(conversation), &bytes)?;
    Ok(serde_json::to_string_pretty(&envelope)?)
}
