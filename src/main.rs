fn main() {
    if let Err(err) = overtime_kiosk_lib::run() {
        log::error!("overtime-kiosk failed: {err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
