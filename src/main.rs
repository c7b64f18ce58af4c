#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tripgen_rs::cli::run().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("tripgen was built without the `cli` feature");
}
