mod app;
mod options;

pub use app::App;
use options::AppOptions;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = AppOptions::from_env()?;
    let app = App::new(options)?;
    app.run()?;

    Ok(())
}
