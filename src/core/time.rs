use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime, Time};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Midnight UTC of the day `value` falls on.
pub(crate) fn start_of_day(value: PrimitiveDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(value.date(), Time::MIDNIGHT)
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Date;

    #[test]
    fn format_primitive_outputs_utc_z() {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        let time = Time::from_hms(10, 20, 30).unwrap();
        let value = PrimitiveDateTime::new(date, time);
        assert_eq!(format_primitive(value), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn start_of_day_truncates_time() {
        let date = Date::from_calendar_date(2025, time::Month::March, 9).unwrap();
        let value = PrimitiveDateTime::new(date, Time::from_hms(23, 59, 1).unwrap());
        assert_eq!(format_primitive(start_of_day(value)), "2025-03-09T00:00:00Z");
    }
}
