use super::*;
use anyhow::{anyhow, Result};

/// Validate the complete configuration
pub fn validate_config(config: &LaunchConfig) -> Result<()> {
    validate_program(&config.program)?;

    if let Some(ref env) = config.env {
        validate_env(env)?;
    }

    for redirect in &config.redirects {
        if redirect.source < 0 || redirect.target < 0 {
            return Err(anyhow!(
                "Redirect descriptors must be non-negative: {} -> {}",
                redirect.source,
                redirect.target
            ));
        }
    }

    if config.proc_root.is_empty() {
        return Err(anyhow!("proc_root cannot be empty"));
    }

    validate_log_level(&config.log_level)
}

fn validate_program(program: &str) -> Result<()> {
    if program.is_empty() {
        return Err(anyhow!("Program path cannot be empty"));
    }

    // No PATH lookup happens, so a relative path would depend on the cwd.
    if !Path::new(program).is_absolute() {
        return Err(anyhow!("Program path must be absolute: {}", program));
    }

    Ok(())
}

fn validate_env(env: &[String]) -> Result<()> {
    for entry in env {
        match entry.find('=') {
            Some(0) | None => {
                return Err(anyhow!("Environment entry must be KEY=VALUE: {}", entry));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}
