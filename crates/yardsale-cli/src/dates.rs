use chrono::NaiveDate;
use yardsale_core::DateRange;

pub(crate) fn preset_lines(today: NaiveDate) -> Vec<String> {
    DateRange::ALL
        .iter()
        .map(|range| match range.resolve(today) {
            Some(w) => format!("{:<13} {} .. {}", range.as_str(), w.from, w.to),
            None => format!("{:<13} (no date filter)", range.as_str()),
        })
        .collect()
}

pub(crate) fn print_presets(today: NaiveDate) {
    println!("date presets for {today}:");
    for line in preset_lines(today) {
        println!("  {line}");
    }
}
