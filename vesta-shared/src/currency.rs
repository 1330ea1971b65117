/// Minor-unit exponent per ISO 4217 currency. Zero-decimal and three-decimal
/// currencies are the exceptions; everything else settles at two decimals.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "XOF" | "XAF" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
        _ => 2,
    }
}

/// Round a decimal amount to the currency's minor-unit precision and express
/// it in minor units. This is the only place monetary rounding happens;
/// intermediate pricing components stay unrounded.
pub fn to_minor_units(amount: f64, currency: &str) -> i64 {
    let factor = 10f64.powi(minor_unit_exponent(currency) as i32);
    (amount * factor).round() as i64
}

pub fn from_minor_units(minor: i64, currency: &str) -> f64 {
    let factor = 10f64.powi(minor_unit_exponent(currency) as i32);
    minor as f64 / factor
}
