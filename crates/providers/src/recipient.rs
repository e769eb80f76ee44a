//! Recipient address checks and phone-number normalisation.

use crate::Channel;

/// Normalise a phone number to digits, optionally with a leading `+`.
///
/// Spaces, dashes, dots and parentheses are dropped. A national number with
/// a leading `0` gets `default_country_code` in place of the zero, so
/// `0812-3456-789` with code `62` becomes `628123456789`.
pub fn normalize_phone(raw: &str, default_country_code: Option<&str>) -> String {
    let trimmed = raw.trim();
    let plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if plus {
        return format!("+{digits}");
    }

    match (digits.strip_prefix('0'), default_country_code) {
        (Some(rest), Some(code)) if !rest.is_empty() => {
            format!("{}{rest}", code.trim_start_matches('+'))
        }
        _ => digits,
    }
}

/// Whether `address` is usable as a destination on `channel`.
pub fn is_valid_address(channel: Channel, address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() {
        return false;
    }
    match channel {
        Channel::Email => match address.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
            None => false,
        },
        Channel::Whatsapp | Channel::Sms => {
            let digits = address.chars().filter(char::is_ascii_digit).count();
            (6..=15).contains(&digits)
        }
    }
}
