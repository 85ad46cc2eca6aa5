//! Show-config command - print the resolved configuration.

use std::path::Path;

use s3relay::config::{default_config_path, RelayConfig};

use crate::error::CliError;

/// Run the show-config command.
pub fn run(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = RelayConfig::load(config_path).map_err(|e| CliError::Config(e.to_string()))?;

    let path = config_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);
    match path {
        Some(path) if path.exists() => println!("# config file: {}", path.display()),
        Some(path) => println!("# config file: {} (not found, using defaults)", path.display()),
        None => println!("# config file: (none)"),
    }
    println!("{}", config);

    if let Err(e) = config.validate() {
        println!();
        println!("# warning: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_show_config_with_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[destination]\nbucket = shown-bucket").unwrap();
        assert!(run(Some(file.path())).is_ok());
    }

    #[test]
    fn test_show_config_rejects_malformed_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transfer]\npart_size = lots").unwrap();
        assert!(matches!(run(Some(file.path())), Err(CliError::Config(_))));
    }
}
