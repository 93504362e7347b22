use tokio::net::TcpListener;

use logsphere::{cli, config::Config, db, store::Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;
    let store = Store::new(pool).with_max_attempts(config.transaction_attempts);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create-user", name, email, role] => return cli::create_user(&store, name, email, role).await,
        ["promote", email, role] => return cli::set_role(&store, email, role).await,
        [] => {}
        _ => {
            eprintln!("usage: logsphere [create-user <name> <email> <role> | promote <email> <role>]");
            std::process::exit(2);
        }
    }

    let app = logsphere::build_app(store, config.secure_cookies).await?;
    let listener = TcpListener::bind(config.bind_addr).await?;

    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
