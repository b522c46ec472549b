use url::Url;

pub const PAYMENT_CALLBACK_HOST: &str = "payment-callback";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentCallback {
    pub result_code: i32,
}

impl PaymentCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

/// Parse `{scheme}://payment-callback?resultCode=<int>`.
///
/// Returns `None` for other schemes, other targets, or a missing or
/// non-integer `resultCode`.
pub fn parse_payment_callback(raw: &str, scheme: &str) -> Option<PaymentCallback> {
    let url = Url::parse(raw.trim()).ok()?;
    if !url.scheme().eq_ignore_ascii_case(scheme) {
        return None;
    }
    let target = url
        .host_str()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| url.path().trim_matches('/'));
    if !target.eq_ignore_ascii_case(PAYMENT_CALLBACK_HOST) {
        return None;
    }
    let result_code = url
        .query_pairs()
        .find_map(|(k, v)| (k == "resultCode").then(|| v.trim().parse::<i32>().ok()))??;
    Some(PaymentCallback { result_code })
}
