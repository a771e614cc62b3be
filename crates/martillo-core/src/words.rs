//! Amount-in-words legend printed on receipts (`SON: TREINTA CON 00/100 SOLES`).

use crate::money::Money;

const UNITS: [&str; 10] = [
    "", "UNO", "DOS", "TRES", "CUATRO", "CINCO", "SEIS", "SIETE", "OCHO", "NUEVE",
];
const TEENS: [&str; 10] = [
    "DIEZ", "ONCE", "DOCE", "TRECE", "CATORCE", "QUINCE", "DIECISEIS", "DIECISIETE",
    "DIECIOCHO", "DIECINUEVE",
];
const TWENTIES: [&str; 10] = [
    "VEINTE", "VEINTIUNO", "VEINTIDOS", "VEINTITRES", "VEINTICUATRO", "VEINTICINCO",
    "VEINTISEIS", "VEINTISIETE", "VEINTIOCHO", "VEINTINUEVE",
];
const TENS: [&str; 10] = [
    "", "", "", "TREINTA", "CUARENTA", "CINCUENTA", "SESENTA", "SETENTA", "OCHENTA", "NOVENTA",
];
const HUNDREDS: [&str; 10] = [
    "", "CIENTO", "DOSCIENTOS", "TRESCIENTOS", "CUATROCIENTOS", "QUINIENTOS", "SEISCIENTOS",
    "SETECIENTOS", "OCHOCIENTOS", "NOVECIENTOS",
];

/// Words for 1..=999. `apocope` shortens a trailing UNO to UN (before MIL,
/// MILLONES).
fn below_thousand(n: u64, apocope: bool) -> String {
    let hundreds = (n / 100) as usize;
    let rest = n % 100;

    let mut parts: Vec<String> = Vec::new();
    if n == 100 {
        return "CIEN".to_string();
    }
    if hundreds > 0 {
        parts.push(HUNDREDS[hundreds].to_string());
    }

    let tail = match rest {
        0 => String::new(),
        1..=9 => UNITS[rest as usize].to_string(),
        10..=19 => TEENS[rest as usize - 10].to_string(),
        20..=29 => TWENTIES[rest as usize - 20].to_string(),
        _ => {
            let unit = rest % 10;
            if unit == 0 {
                TENS[(rest / 10) as usize].to_string()
            } else {
                format!("{} Y {}", TENS[(rest / 10) as usize], UNITS[unit as usize])
            }
        }
    };
    if !tail.is_empty() {
        let tail = if apocope && tail.ends_with("UNO") {
            tail[..tail.len() - 1].to_string()
        } else {
            tail
        };
        parts.push(tail);
    }

    parts.join(" ")
}

/// Spanish words for a non-negative integer, up to the hundreds of billions.
pub fn integer_to_words(n: u64) -> String {
    if n == 0 {
        return "CERO".to_string();
    }

    let millions = n / 1_000_000;
    let thousands = (n / 1_000) % 1_000;
    let units = n % 1_000;

    let mut parts: Vec<String> = Vec::new();
    match millions {
        0 => {}
        1 => parts.push("UN MILLON".to_string()),
        m => parts.push(format!("{} MILLONES", integer_to_words_apocope(m))),
    }
    match thousands {
        0 => {}
        1 => parts.push("MIL".to_string()),
        t => parts.push(format!("{} MIL", below_thousand(t, true))),
    }
    if units > 0 {
        parts.push(below_thousand(units, false));
    }

    parts.join(" ")
}

fn integer_to_words_apocope(n: u64) -> String {
    if n < 1_000 {
        below_thousand(n, true)
    } else {
        let words = integer_to_words(n);
        match words.strip_suffix("UNO") {
            Some(stem) => format!("{}UN", stem),
            None => words,
        }
    }
}

/// The legend printed under the receipt total.
///
/// ## Example
/// ```rust
/// use martillo_core::money::Money;
/// use martillo_core::words::amount_in_words;
///
/// assert_eq!(amount_in_words(Money::from_cents(3000)), "SON: TREINTA CON 00/100 SOLES");
/// ```
pub fn amount_in_words(amount: Money) -> String {
    let soles = amount.soles().unsigned_abs();
    format!(
        "SON: {} CON {:02}/100 SOLES",
        integer_to_words(soles),
        amount.cents_part()
    )
}
