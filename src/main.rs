use meeting_actions::config::Config;
use meeting_actions::server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = Config::from_env();
    let auth = server::build_auth_service(&config);

    server::run(config, auth).await
}
