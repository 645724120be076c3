use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Добавляет схему к URL STUN сервера, если она отсутствует
pub fn add_ice_url_scheme(url: &str) -> String {
    if url.starts_with("stun:") || url.starts_with("stuns:") {
        url.to_string()
    } else {
        format!("stun:{}", url)
    }
}
