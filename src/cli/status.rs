use super::{resolve, ConfigSource};
use duet::config::ConfigResolution;

/// Report configuration status
///
/// Resolves configuration the same way a client process would and prints
/// either the resolved identifiers or the variables that are missing.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (source, resolution) = resolve(config_path.as_deref())?;

    println!("📊 Duet Status");
    println!();
    for line in render(&source, &resolution) {
        println!("{}", line);
    }

    Ok(())
}

/// Status report lines.
pub fn render(source: &ConfigSource, resolution: &ConfigResolution) -> Vec<String> {
    let mut lines = vec![match source {
        ConfigSource::File(path) => format!("Source: {}", path.display()),
        ConfigSource::Environment => "Source: environment".to_string(),
    }];

    match resolution {
        ConfigResolution::Configured(config) => {
            lines.push("✅ Configured".to_string());
            lines.push(format!("  Network: {}", config.ledger.network));
            lines.push(format!("  Package: {}", config.ledger.package_id));
            lines.push(format!("  Module: {}", config.ledger.module_name));
            lines.push(format!("  Registry: {}", config.ledger.registry_id));
            lines.push(format!("  Address: {}", config.ledger.self_address));
            lines.push(match &config.policy {
                Some(policy) => format!("  Policy service: {}", policy.base_url),
                None => "  Policy service: not configured".to_string(),
            });
            lines.push(match &config.blob {
                Some(blob) => format!(
                    "  Blob store: {} (retention {} epochs)",
                    blob.endpoint, blob.default_retention
                ),
                None => "  Blob store: not configured".to_string(),
            });
        }
        ConfigResolution::Unconfigured { missing } => {
            lines.push("❌ Unconfigured".to_string());
            lines.push(format!("  Missing: {}", missing.join(", ")));
        }
    }

    lines
}
