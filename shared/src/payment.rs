use serde::{Deserialize, Serialize};
use url::Url;

/// Every payment tag points at this endpoint, the record travels in the query.
pub const PAYMENT_BASE_URL: &str = "https://example.com/pay";

/// Longest account or amount the keypad accepts.
pub const FIELD_MAX_LEN: usize = 16;

/// Keypad key -> bank code embedded in the payment URL.
pub const BANK_OPTIONS: [(&str, &str); 16] = [
    ("1", "KB"),
    ("2", "WOORI"),
    ("3", "SHINHAN"),
    ("4", "HANA"),
    ("5", "NH"),
    ("6", "IBK"),
    ("7", "SC"),
    ("8", "CITI"),
    ("9", "BUSAN"),
    ("10", "DGB(IM Bank)"),
    ("11", "GWANGJU"),
    ("12", "JB"),
    ("13", "JEJU"),
    ("14", "KAKAO"),
    ("15", "K BANK"),
    ("16", "SUHYUP"),
];

pub fn bank_code(key: &str) -> Option<&'static str> {
    BANK_OPTIONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, code)| *code)
}

/// Payment metadata stored on a tag.
///
/// Fields stay strings: account numbers keep their leading zeros and amounts
/// are never rounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub bank: String,
    pub account: String,
    pub amount: String,
}

impl PaymentRecord {
    pub fn new(
        bank: impl Into<String>,
        account: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            bank: bank.into(),
            account: account.into(),
            amount: amount.into(),
        }
    }

    /// Same bank and account, new amount.
    pub fn with_amount(self, amount: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            ..self
        }
    }

    /// Name of the first empty field, if any.
    pub fn first_empty_field(&self) -> Option<&'static str> {
        [
            ("bank", &self.bank),
            ("account", &self.account),
            ("amount", &self.amount),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
    }

    /// Canonical payment URL, `https://example.com/pay?bank=..&account=..&amount=..`.
    ///
    /// Values are form-urlencoded, which leaves digits and letters untouched.
    pub fn to_url(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("bank", &self.bank)
            .append_pair("account", &self.account)
            .append_pair("amount", &self.amount)
            .finish();
        format!("{PAYMENT_BASE_URL}?{query}")
    }

    /// Parses a payment URL. Parameters may come in any order; a missing one
    /// becomes an empty string and the first occurrence of a repeated one wins.
    pub fn from_url(url: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url)?;
        let mut bank = None;
        let mut account = None;
        let mut amount = None;
        for (name, value) in parsed.query_pairs() {
            let slot = match name.as_ref() {
                "bank" => &mut bank,
                "account" => &mut account,
                "amount" => &mut amount,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        Ok(Self {
            bank: bank.unwrap_or_default(),
            account: account.unwrap_or_default(),
            amount: amount.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_for_plain_fields() {
        let record = PaymentRecord::new("KB", "1234567890", "50000");
        assert_eq!(
            record.to_url(),
            "https://example.com/pay?bank=KB&account=1234567890&amount=50000"
        );
    }

    #[test]
    fn parameters_are_order_independent() {
        let record =
            PaymentRecord::from_url("https://example.com/pay?amount=7&bank=NH&account=0012")
                .unwrap();
        assert_eq!(record, PaymentRecord::new("NH", "0012", "7"));
    }

    #[test]
    fn missing_parameters_default_to_empty() {
        let record = PaymentRecord::from_url("https://example.com/pay?bank=SC").unwrap();
        assert_eq!(record, PaymentRecord::new("SC", "", ""));
    }

    #[test]
    fn repeated_parameter_keeps_first_value() {
        let record =
            PaymentRecord::from_url("https://example.com/pay?bank=KB&bank=NH&account=1&amount=2")
                .unwrap();
        assert_eq!(record.bank, "KB");
    }

    #[test]
    fn bank_codes_with_spaces_and_parens_round_trip() {
        for (_, code) in BANK_OPTIONS {
            let record = PaymentRecord::new(code, "1", "2");
            assert_eq!(PaymentRecord::from_url(&record.to_url()).unwrap(), record);
        }
    }

    #[test]
    fn relative_url_is_rejected() {
        assert!(PaymentRecord::from_url("pay?bank=KB").is_err());
    }

    #[test]
    fn bank_lookup() {
        assert_eq!(bank_code("1"), Some("KB"));
        assert_eq!(bank_code("14"), Some("KAKAO"));
        assert_eq!(bank_code("17"), None);
        assert_eq!(bank_code(""), None);
    }

    #[test]
    fn first_empty_field_reports_in_declaration_order() {
        assert_eq!(PaymentRecord::new("KB", "1", "2").first_empty_field(), None);
        assert_eq!(
            PaymentRecord::new("KB", "", "").first_empty_field(),
            Some("account")
        );
        assert_eq!(
            PaymentRecord::new("KB", "1", "").first_empty_field(),
            Some("amount")
        );
    }
}
