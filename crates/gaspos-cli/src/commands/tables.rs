use gaspos_core::sync::TableRegistry;

pub fn run_tables() {
    for line in format_table_lines(&TableRegistry::standard()) {
        println!("{line}");
    }
}

pub fn format_table_lines(registry: &TableRegistry) -> Vec<String> {
    registry
        .iter()
        .map(|spec| {
            let mut flags = Vec::new();
            if spec.is_authoritative() {
                flags.push("authoritative");
            }
            if spec.is_critical() {
                flags.push("critical");
            }
            format!(
                "{:<18} {:<16} {}",
                spec.name(),
                spec.record_type(),
                flags.join(", ")
            )
            .trim_end()
            .to_string()
        })
        .collect()
}
