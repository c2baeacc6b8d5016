#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub app_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    // CHIP collect API (purchases)
    pub chip_api_base_url: String,
    pub chip_brand_id: String,
    pub chip_secret_key: String,
    // CHIP Send API (disbursements)
    pub chip_send_base_url: String,
    pub chip_send_api_key: String,
    pub chip_send_api_secret: String,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");
        let app_url = std::env::var("APP_URL").expect("APP_URL must be set");
        let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());

        // CHIP collect configurations (with defaults)
        let chip_api_base_url = std::env::var("CHIP_API_BASE_URL")
            .unwrap_or_else(|_| "https://gate.chip-in.asia/api/v1".to_string());
        let chip_brand_id = std::env::var("CHIP_BRAND_ID")
            .unwrap_or_else(|_| "test_brand_id".to_string());
        let chip_secret_key = std::env::var("CHIP_SECRET_KEY")
            .unwrap_or_else(|_| "test_secret_key".to_string());

        // CHIP Send configurations (with defaults)
        let chip_send_base_url = std::env::var("CHIP_SEND_BASE_URL")
            .unwrap_or_else(|_| "https://api.chip-in.asia/api".to_string());
        let chip_send_api_key = std::env::var("CHIP_SEND_API_KEY")
            .unwrap_or_else(|_| "test_send_api_key".to_string());
        let chip_send_api_secret = std::env::var("CHIP_SEND_API_SECRET")
            .unwrap_or_else(|_| "test_send_api_secret".to_string());

        Config {
            database_url,
            app_url,
            jwt_secret,
            jwt_maxage: jwt_maxage.parse::<i64>().unwrap(),
            port: port.parse::<u16>().unwrap(),
            chip_api_base_url,
            chip_brand_id,
            chip_secret_key,
            chip_send_base_url,
            chip_send_api_key,
            chip_send_api_secret,
        }
    }
}
