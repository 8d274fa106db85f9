/// Example program to print the loaded configuration
///
/// Run with: cargo run -p quill-config --example print_config

fn main() {
    // Load configuration from quill.toml
    let config = quill_config::QuillConfig::load();

    println!("=== Quill Configuration ===\n");

    println!("Editor Settings:");
    println!("  Namespace: {}", config.editor.namespace);
    println!("  Spellcheck: {}", config.editor.spellcheck);
    println!("  Autocorrect: {}", config.editor.autocorrect);
    println!("  Placeholder: {:?}", config.editor.placeholder);
    println!();

    println!("Resource Settings:");
    println!("  Root Dir: {:?}", config.resources.root_dir);
    println!("  Staging Dir: {:?}", config.resources.staging_dir);
    println!("  Base Document: {}", config.resources.base_document);
    println!("  User Script: {:?}", config.resources.user_script);
    println!("  User CSS: {:?}", config.resources.user_css);
    println!();

    println!("Bridge Settings:");
    println!("  Claim First Responder: {}", config.bridge.claim_first_responder_on_ready);
    println!("  Ready Timeout (ms): {}", config.bridge.ready_timeout_ms);
    println!("  Message Handler: {}", config.bridge.message_handler);
    println!();

    println!("Top-level attributes: {}", config.top_level_attributes());
}
