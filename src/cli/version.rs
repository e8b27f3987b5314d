/// Display version information
pub fn execute() {
    println!("duet {}", env!("CARGO_PKG_VERSION"));
    println!("Two-party encrypted messaging over a ledger");
}
