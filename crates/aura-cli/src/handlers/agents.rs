//! Agents command handler.

use anyhow::Result;
use aura_core::{AgentRoster, UserProfile};

/// List the built-in agents, or print one agent's system instruction.
pub fn execute(
    prompt: Option<&str>,
    user_name: Option<String>,
    user_info: Option<String>,
) -> Result<()> {
    let mut roster = AgentRoster::new();

    if let Some(id) = prompt {
        let agent = roster.set_current(id)?;
        let user = UserProfile {
            name: user_name,
            info: user_info,
        };
        println!("{}", agent.system_instruction(&user));
        return Ok(());
    }

    println!("{:<16} {:<18} {:<8} Color", "ID", "Name", "Voice");
    println!("{}", "-".repeat(52));
    let current = roster.current().id.clone();
    for agent in roster.presets() {
        let marker = if agent.id == current { " (default)" } else { "" };
        println!(
            "{:<16} {:<18} {:<8} {}{marker}",
            agent.id,
            agent.name,
            agent.voice.as_str(),
            agent.body_color
        );
    }
    Ok(())
}
