use std::io::{self, Write};

use crate::config::Config;
use crate::error::{ExportError, Result};

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Quote a value as a TOML basic string.
fn toml_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render(site: &str, email: &str, api_token: &str) -> String {
    let site_key = if site.contains("://") { "base_url" } else { "subdomain" };
    format!(
        "{site_key} = {}\nemail = {}\napi_token = {}\n",
        toml_string(site),
        toml_string(email),
        toml_string(api_token)
    )
}

pub async fn run() -> Result<()> {
    let config_path = Config::config_path()?;

    if config_path.exists() {
        let answer = prompt(&format!(
            "Config file already exists at {}. Overwrite? [y/N] ",
            config_path.display()
        ))?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    println!("Helpdesk Export Configuration");
    println!("=============================\n");

    let site = prompt("Helpdesk subdomain or full base URL (e.g. acme or https://acme.zendesk.com): ")?;
    if site.is_empty() {
        return Err(ExportError::MissingBaseUrl);
    }

    let email = prompt("Agent email: ")?;
    let api_token = prompt("API token: ")?;
    if email.is_empty() || api_token.is_empty() {
        return Err(ExportError::MissingCredentials);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ExportError::ConfigWrite {
            path: config_path.clone(),
            source: e,
        })?;
    }

    std::fs::write(&config_path, render(&site, &email, &api_token)).map_err(|e| {
        ExportError::ConfigWrite {
            path: config_path.clone(),
            source: e,
        }
    })?;

    println!("\nConfig saved to {}", config_path.display());
    println!("You can now run 'helpdesk-export export'!");

    Ok(())
}
