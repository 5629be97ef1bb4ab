use hono_tools::ToolRegistry;
use serde_json::Value;

pub fn list() {
    let registry = ToolRegistry::with_defaults();
    let mut names = registry.tool_names();
    names.sort();

    println!("{} tools available:", names.len());
    println!();
    for name in &names {
        if let Some(tool) = registry.get(name) {
            let schema = tool.schema();
            let summary: String = schema.description.chars().take(70).collect();
            let role = tool
                .required_role()
                .map(|r| format!(" [{}]", r.as_str()))
                .unwrap_or_default();
            println!("  {:<24}{} {}", name, role, summary);
        }
    }
    println!();
    println!("Use `hono tools info <name>` for parameters.");
}

pub fn info(name: &str) -> anyhow::Result<()> {
    let registry = ToolRegistry::with_defaults();
    let tool = registry
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found. Use `hono tools list`.", name))?;
    let schema = tool.schema();

    println!("{}", schema.name);
    println!("{}", "=".repeat(schema.name.len()));
    println!("{}", schema.description);
    if let Some(role) = tool.required_role() {
        println!();
        println!("Requires role: {}", role.as_str());
    }
    println!();

    let required: Vec<&str> = schema
        .parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    match schema.parameters.get("properties").and_then(Value::as_object) {
        Some(props) if !props.is_empty() => {
            println!("Parameters:");
            for (key, val) in props {
                let typ = val.get("type").and_then(Value::as_str).unwrap_or("any");
                let req = if required.contains(&key.as_str()) { " (required)" } else { "" };
                let enums = val
                    .get("enum")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        let vals: Vec<&str> = arr.iter().filter_map(Value::as_str).collect();
                        format!(" [{}]", vals.join("|"))
                    })
                    .unwrap_or_default();
                println!("  {:<20} {:<8}{}{}", key, typ, req, enums);
                if let Some(desc) = val.get("description").and_then(Value::as_str) {
                    println!("    {}", desc);
                }
            }
        }
        _ => println!("No parameters."),
    }
    Ok(())
}
