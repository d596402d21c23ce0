use vaccel::{Config, Session};

fn main() -> vaccel::Result<()> {
    let config = Config::from_env();
    vaccel::logging::init(&config);

    let mut session = Session::with_config(&config, 0)?;
    vaccel::noop(&session)?;
    session.release()?;

    println!("noop on session {} done", session.id());
    Ok(())
}
