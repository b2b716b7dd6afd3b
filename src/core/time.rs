use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

const MAX_LOOKBACK_MINUTES: u64 = 525_600;

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn minutes_ago(now: PrimitiveDateTime, minutes: u64) -> PrimitiveDateTime {
    now - Duration::minutes(minutes.min(MAX_LOOKBACK_MINUTES) as i64)
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}
