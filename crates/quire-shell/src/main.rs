use std::process;

use quire_shell::script::{self, Script};

fn main() {
    tracing_subscriber::fmt::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: quire-shell <script.json>");
        process::exit(2);
    };

    let text = std::fs::read_to_string(&path).unwrap_or_else(|e| {
        eprintln!("failed to read {path}: {e}");
        process::exit(1);
    });

    let script = Script::parse(&text).unwrap_or_else(|e| {
        eprintln!("{path}: {e}");
        process::exit(1);
    });

    let mut config = script.config.clone().unwrap_or_default();
    script::apply_env(&mut config, |key| std::env::var(key).ok());
    tracing::info!(
        commands = script.commands.len(),
        max_batch_size = config.max_batch_size,
        bypass_validation = config.bypass_validation,
        "running {path}"
    );

    let replies = script::run(&script, config).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    for reply in replies {
        println!("{}", script::render(reply));
    }
}
