mod infra;
mod runtime;

fn main() {
    if let Err(e) = runtime::run_from_args() {
        eprintln!("labmon: {e}");
        std::process::exit(1);
    }
}
