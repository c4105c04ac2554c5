use std::sync::Arc;

use camera_kernel::{Janitor, KernelConfig, KernelFacade, logging};
use tracing::{error, info};

/// Minimal daemon host: the HTTP control surface that would call into the
/// facade is out of scope, so this binary only brings the kernel's own
/// background machinery to life (registry watch, freshness/crash
/// supervision threads owned by the supervisors, HLS segment sweep) and
/// keeps the process alive for an external caller to attach to.
fn main() {
    let config = match KernelConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let _log_guard = match logging::init(&config.log_path()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {err:#}");
            std::process::exit(1);
        }
    };

    for dir in [config.tmp_root(), config.record_root(), config.backup_root()] {
        if let Err(err) = std::fs::create_dir_all(&dir) {
            error!(path = %dir.display(), error = %err, "failed to create base directory");
            std::process::exit(1);
        }
    }

    info!(base_dir = %config.base_dir.display(), "camera supervision kernel starting");

    let facade = KernelFacade::new(config);
    let _registry_monitor = camera_kernel::registry::spawn_change_monitor(facade.registry().clone());

    let janitor = Janitor::new(Arc::new(facade.config().clone()), facade.registry().clone());
    let _hls_sweep = janitor.spawn_hls_sweep();

    let bulk = facade.start_all_recordings();
    info!(started = bulk.succeeded.len(), failed = bulk.failed.len(), "boot-time auto_record start pass complete");

    loop {
        std::thread::park();
    }
}
