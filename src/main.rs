fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if handle_cli_flags(&args) {
        return;
    }

    let location = args.iter().find(|arg| !arg.starts_with('-')).cloned();
    if let Err(err) = clipfeed::run(location.as_deref()) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags(args: &[String]) -> bool {
    let mut saw_flag = false;
    for arg in args {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("clipfeed {}", clipfeed::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "clipfeed — Swipe through your self-hosted short-video library from the terminal.\n\nUsage: clipfeed [LOCATION]\n\n  LOCATION             Optional app path, e.g. /liked or /all/<video-id>\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}
