use clap::Parser;
use client::Client;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = shared::DEFAULT_HOST)]
    host: String,

    /// Server port to connect to
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    println!("Connecting to chat server at {}...", address);

    let client = match Client::connect(&address).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let exit = client.run(tokio::io::stdin(), &mut tokio::io::stdout()).await?;
    info!("Client finished: {:?}", exit);

    // Stdin is read on a blocking thread that cannot be cancelled, so waiting
    // for the runtime to shut down could hang until the next keypress
    std::process::exit(0);
}
