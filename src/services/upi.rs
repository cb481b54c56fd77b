//! UPI deep link, Android intent and QR code URL construction.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use url::form_urlencoded::byte_serialize;

/// UPI apps truncate longer payee names.
pub const MAX_PAYEE_NAME_LEN: usize = 25;
/// Provider limit for the transaction note.
pub const MAX_NOTE_LEN: usize = 40;

const QR_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";
const QR_SIZE: &str = "320x320";
const ANDROID_PAY_PACKAGE: &str = "com.google.android.apps.nbu.paisa.user";

/// Links a customer uses to pay for an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpiPaymentLinks {
    pub link: String,
    pub intent_link: String,
    pub qr_url: String,
}

#[derive(Debug, Clone)]
pub struct UpiPayment<'a> {
    pub payee_vpa: &'a str,
    pub payee_name: &'a str,
    pub amount: Decimal,
    pub currency: &'a str,
    /// Order number, used for the note and the transaction reference
    pub reference: &'a str,
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect::<String>().replace('+', "%20")
}

/// Letters, digits and spaces only, truncated to the UPI name limit.
pub fn sanitize_payee_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .take(MAX_PAYEE_NAME_LEN)
        .collect()
}

/// Two-decimal fixed representation expected by UPI apps.
pub fn format_amount(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

impl UpiPayment<'_> {
    pub fn deep_link(&self) -> String {
        let note: String = format!("Order {}", self.reference)
            .chars()
            .take(MAX_NOTE_LEN)
            .collect();
        format!(
            "upi://pay?pa={}&pn={}&am={}&cu={}&tn={}&tr={}",
            self.payee_vpa,
            encode(&sanitize_payee_name(self.payee_name)),
            format_amount(self.amount),
            self.currency,
            encode(&note),
            encode(self.reference),
        )
    }

    pub fn links(&self) -> UpiPaymentLinks {
        let link = self.deep_link();
        UpiPaymentLinks {
            intent_link: intent_link(&link),
            qr_url: qr_code_url(&link),
            link,
        }
    }
}

/// Android intent that opens the UPI link in Google Pay.
pub fn intent_link(upi_link: &str) -> String {
    format!(
        "intent:{}#Intent;scheme=upi;package={};end",
        upi_link, ANDROID_PAY_PACKAGE
    )
}

pub fn qr_code_url(upi_link: &str) -> String {
    format!("{}?size={}&data={}", QR_ENDPOINT, QR_SIZE, encode(upi_link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment() -> UpiPayment<'static> {
        UpiPayment {
            payee_vpa: "elegancesarees@upi",
            payee_name: "Elegance Sarees & Co. (Official Store) Chennai",
            amount: dec!(1398),
            currency: "INR",
            reference: "ORD-1717171717171",
        }
    }

    #[test]
    fn deep_link_contains_all_parameters() {
        let link = payment().deep_link();
        assert_eq!(
            link,
            "upi://pay?pa=elegancesarees@upi&pn=Elegance%20Sarees%20%20Co%20Offic&am=1398.00&cu=INR&tn=Order%20ORD-1717171717171&tr=ORD-1717171717171"
        );
    }

    #[test]
    fn payee_name_strips_symbols_and_truncates() {
        let name = sanitize_payee_name("Silk & Co.!! Premium Handloom House");
        assert!(name.chars().count() <= MAX_PAYEE_NAME_LEN);
        assert!(name.chars().all(|c| c.is_alphanumeric() || c == ' '));
        assert_eq!(name, "Silk  Co Premium Handloom");
    }

    #[test]
    fn payee_name_keeps_non_latin_letters() {
        assert_eq!(sanitize_payee_name("  कमल घर!  "), "कमल घर");
        assert_eq!(sanitize_payee_name("Kanchi ११ Silks"), "Kanchi ११ Silks");
    }

    #[test]
    fn amount_has_two_decimals() {
        assert_eq!(format_amount(dec!(99)), "99.00");
        assert_eq!(format_amount(dec!(1234.5)), "1234.50");
        assert_eq!(format_amount(dec!(10.005)), "10.01");
    }

    #[test]
    fn note_is_truncated_to_provider_limit() {
        let long_ref = "ORD-".to_string() + &"9".repeat(60);
        let p = UpiPayment {
            reference: &long_ref,
            ..payment()
        };
        let link = p.deep_link();
        let tn = link
            .split('&')
            .find_map(|kv| kv.strip_prefix("tn="))
            .unwrap();
        let decoded = tn.replace("%20", " ");
        assert_eq!(decoded.chars().count(), MAX_NOTE_LEN);
    }

    #[test]
    fn intent_and_qr_wrap_the_link() {
        let links = payment().links();
        assert!(links.intent_link.starts_with("intent:upi://pay?"));
        assert!(links.intent_link.ends_with(";end"));
        assert!(links
            .qr_url
            .starts_with("https://api.qrserver.com/v1/create-qr-code/?size=320x320&data=upi%3A%2F%2Fpay"));
    }
}
