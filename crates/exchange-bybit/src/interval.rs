use signal_trader_core::interval::Interval;

/// Value of Bybit's `interval` query parameter.
#[must_use]
pub const fn bybit_code(interval: Interval) -> &'static str {
    match interval {
        Interval::OneMinute => "1",
        Interval::ThreeMinutes => "3",
        Interval::FiveMinutes => "5",
        Interval::FifteenMinutes => "15",
        Interval::ThirtyMinutes => "30",
        Interval::OneHour => "60",
        Interval::TwoHours => "120",
        Interval::FourHours => "240",
        Interval::SixHours => "360",
        Interval::TwelveHours => "720",
        Interval::OneDay => "D",
        Interval::OneWeek => "W",
        Interval::OneMonth => "M",
    }
}
