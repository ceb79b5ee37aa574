use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use recon_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
///
/// 同时接受 5 段（分 时 日 月 周）和 6/7 段（带秒、年）表达式，5 段表达式在前面补秒字段。
pub struct CronScheduler {
    expr: String,
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize_expression(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expr: cron_expr.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.schedule.after(&now).next().map(|next| next - now)
    }

    /// 周期任务是否应在本轮触发
    ///
    /// 下一次执行时间落在前瞻窗口内，且距上次触发已超过冷却时间。
    pub fn should_fire(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        lookahead: Duration,
        cooldown: Duration,
    ) -> bool {
        let Some(offset) = self.time_until_next_execution(now) else {
            return false;
        };

        if offset >= lookahead {
            return false;
        }

        match last_run {
            Some(last) if (now - last).abs() <= cooldown => {
                debug!(
                    "周期任务 {} 仍在冷却中，上次触发: {}",
                    self.expr,
                    last.format("%Y-%m-%d %H:%M:%S UTC")
                );
                false
            }
            _ => true,
        }
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 获取任务的执行频率描述
    pub fn get_frequency_description(&self) -> String {
        let upcoming = self.upcoming_times(Utc::now(), 2);
        if upcoming.len() >= 2 {
            let seconds = (upcoming[1] - upcoming[0]).num_seconds();

            match seconds {
                s if s < 60 => format!("每{s}秒"),
                s if s < 3600 => format!("每{}分钟", s / 60),
                s if s < 86400 => format!("每{}小时", s / 3600),
                s if s < 604800 => format!("每{}天", s / 86400),
                s => format!("每{}周", s / 604800),
            }
        } else {
            "无法确定频率".to_string()
        }
    }
}

/// 把 5 段 crontab 表达式转换为带秒字段的形式
///
/// crontab 的星期字段 0/7 表示周日，而解析库使用 1-7（1 为周日），数字需要整体加一。
fn normalize_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return fields.join(" ");
    }

    let day_of_week = fields[4]
        .split(',')
        .map(shift_day_of_week_item)
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    )
}

fn shift_day_of_week_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    let shift = |value: &str| -> String {
        match value.parse::<u8>() {
            Ok(7) => "1".to_string(),
            Ok(n) if n < 7 => (n + 1).to_string(),
            _ => value.to_string(),
        }
    };

    let shifted = match range.split_once('-') {
        Some((start, "7")) => {
            // 以周日结尾的区间拆成 start..周六 加周日
            return format!("{}-7,1", shift(start));
        }
        Some((start, end)) => format!("{}-{}", shift(start), shift(end)),
        None => shift(range),
    };

    match step {
        Some(step) => format!("{shifted}/{step}"),
        None => shifted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    #[test]
    fn test_five_field_expression_is_accepted() {
        let cron = CronScheduler::new("*/5 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        let next = cron.next_execution_time(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn test_day_of_week_is_shifted() {
        // 2024-01-01 是周一，crontab 中 0 表示周日
        let cron = CronScheduler::new("0 3 * * 0").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = cron.next_execution_time(from).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next.hour(), 3);

        let weekdays = CronScheduler::new("0 9 * * 1-5").unwrap();
        let next = weekdays.next_execution_time(from).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn test_six_field_expression_passthrough() {
        assert!(CronScheduler::new("30 0 * * * *").is_ok());
        assert!(matches!(
            CronScheduler::new("not a cron"),
            Err(SchedulerError::InvalidCron { .. })
        ));
    }

    #[test]
    fn test_cooldown_blocks_recent_fire() {
        let cron = CronScheduler::new("*/5 * * * *").unwrap();
        // 距离下一次 00:05:00 还有 20 秒
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 4, 40).unwrap();
        let lookahead = Duration::seconds(60);
        let cooldown = Duration::seconds(180);

        assert!(!cron.should_fire(Some(now - Duration::seconds(30)), now, lookahead, cooldown));
        assert!(cron.should_fire(Some(now - Duration::seconds(181)), now, lookahead, cooldown));
        assert!(cron.should_fire(None, now, lookahead, cooldown));
    }

    #[test]
    fn test_outside_lookahead_does_not_fire() {
        let cron = CronScheduler::new("*/5 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
        assert!(!cron.should_fire(None, now, Duration::seconds(60), Duration::seconds(180)));
    }

    #[test]
    fn test_normalize_sunday_range() {
        assert_eq!(normalize_expression("0 0 * * 5-7"), "0 0 0 * * 6-7,1");
        assert_eq!(normalize_expression("0 0 * * */2"), "0 0 0 * * */2");
        assert_eq!(normalize_expression("0 0 * * MON"), "0 0 0 * * MON");
    }
}
