use rand::Rng;

/// Build a key barcode: prefix, last 8 digits of the millisecond clock,
/// then a zero-padded 3-digit random suffix
pub fn generate_key_barcode(prefix: &str, now_millis: i64) -> String {
    let suffix: u16 = rand::rng().random_range(0..1000);
    format_key_barcode(prefix, now_millis, suffix)
}

pub fn format_key_barcode(prefix: &str, now_millis: i64, suffix: u16) -> String {
    let clock = now_millis.unsigned_abs() % 100_000_000;
    format!("{}{:08}{:03}", prefix, clock, suffix % 1000)
}
