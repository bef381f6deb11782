//! `docket agents`

use docket_core::AgentKind;

pub fn run() -> anyhow::Result<()> {
    println!("{:<18} {:>8} {:>9}  depends on", "agent", "priority", "timeout");
    for kind in AgentKind::ALL {
        let spec = kind.spec();
        let deps: Vec<&str> = spec.dependencies.iter().map(AgentKind::as_str).collect();
        println!(
            "{:<18} {:>8} {:>8}s  {}",
            kind.as_str(),
            spec.priority,
            spec.default_timeout.as_secs(),
            if deps.is_empty() { "-".to_string() } else { deps.join(", ") }
        );
    }
    Ok(())
}
