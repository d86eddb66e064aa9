pub mod counter;
pub mod gauge;
pub mod stats;
pub mod timer;
pub mod wheel;

/// Floor-aligns a wall-clock second to a retention interval boundary:
/// `floor(now / interval) * interval`. Consecutive flushes within one
/// interval share the same aligned timestamp; consumers tolerate the
/// duplicates.
pub fn aligned_timestamp(now_unix: i64, interval: u64) -> i64 {
    let interval = interval as i64;
    now_unix - now_unix.rem_euclid(interval)
}
