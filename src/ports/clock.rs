use chrono::NaiveDate;

/// 今日の日付を返すポート
///
/// 貸出日・返却日は日付のみで扱う。
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}
