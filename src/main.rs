fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let email = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "john@example.com".to_string());
    communicare_lib::run(&email)
}
