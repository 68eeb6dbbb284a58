//! `lectern config`: print the effective configuration.

use anyhow::Result;

use crate::bootstrap::CliConfig;

/// Print `config` as pretty JSON on stdout.
pub fn execute(config: &CliConfig) -> Result<()> {
    println!("{}", render(config)?);
    Ok(())
}

fn render(config: &CliConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_camel_case_sections() {
        let json = render(&CliConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["audio"]["outputSampleRate"], 24_000);
        assert_eq!(value["audio"]["frameSize"], 4096);
        assert_eq!(value["session"]["voice"], "Zephyr");
    }
}
