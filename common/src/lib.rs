use owo_colors::OwoColorize;

pub mod shutdown;

/// Process-wide setup shared by every binary in this workspace: installs a
/// panic hook that exits the process non-zero (so a container restarts
/// rather than limping on with a poisoned thread) and prints a startup
/// banner.
pub fn init() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));
    println!("{}", "🔧 multi-platform-controller starting up".green());
}

/// Emits the log line operators grep for when checking that a replica has
/// finished its startup sequence (leader election wiring, client
/// construction, ...) and is ready to serve.
pub fn signal_ready() {
    println!("{}", "✅ ready".green());
}
