use hono_core::{Config, Paths};
use serde_json::Value;

pub fn init(paths: &Paths, force: bool) -> anyhow::Result<()> {
    let config_path = paths.config_file();
    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }
    Config::default().save(&config_path)?;
    std::fs::create_dir_all(paths.data_dir())?;
    println!("✓ Wrote {}", config_path.display());
    println!("  Add an API key under providers.openai.apiKey (or openrouter / deepseek).");
    Ok(())
}

pub fn show(paths: &Paths) -> anyhow::Result<()> {
    let config = Config::load_or_default(paths)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn get(paths: &Paths, key: &str) -> anyhow::Result<()> {
    let config = Config::load_or_default(paths)?;
    let json = serde_json::to_value(&config)?;
    match resolve_json_path(&json, key) {
        Some(Value::String(s)) => println!("{}", s),
        Some(v) => println!("{}", serde_json::to_string_pretty(&v)?),
        None => anyhow::bail!("Unknown config key: {}", key),
    }
    Ok(())
}

/// Values are parsed as JSON when possible, so `60` becomes a number and `"60"` stays a string.
pub fn set(paths: &Paths, key: &str, value: &str) -> anyhow::Result<()> {
    let config = Config::load_or_default(paths)?;
    let mut json = serde_json::to_value(&config)?;
    let parsed = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
    set_json_path(&mut json, key, parsed);

    let updated: Config = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))?;
    updated.validate()?;
    updated.save(&paths.config_file())?;
    println!("✓ {} = {}", key, value);
    Ok(())
}

fn resolve_json_path(json: &Value, path: &str) -> Option<Value> {
    let mut current = json;
    for part in path.split('.') {
        let camel = to_camel_case(part);
        current = current.get(&camel).or_else(|| current.get(part))?;
    }
    Some(current.clone())
}

fn set_json_path(json: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = json;
    for (i, part) in parts.iter().enumerate() {
        let camel = to_camel_case(part);
        let key = if current.get(&camel).is_some() {
            camel
        } else {
            part.to_string()
        };

        if i == parts.len() - 1 {
            current[&key] = value;
            return;
        }
        if !current.get(&key).map(Value::is_object).unwrap_or(false) {
            current[&key] = serde_json::json!({});
        }
        current = &mut current[&key];
    }
}

fn to_camel_case(s: &str) -> String {
    let mut result = String::new();
    let mut upper = false;
    for ch in s.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            result.extend(ch.to_uppercase());
            upper = false;
        } else {
            result.push(ch);
        }
    }
    result
}
