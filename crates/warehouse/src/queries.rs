//! SQL for the analyst tools.
//!
//! Table references are qualified with the configured dataset; values
//! supplied by the conversation are always bound as `@` parameters.

/// Players whose per-minute action count on one item exceeds `@min_apm`.
pub fn suspicious_players(dataset: &str) -> String {
    format!(
        "SELECT
    player_id,
    item_id,
    CAST(TIMESTAMP_TRUNC(event_timestamp, MINUTE) AS STRING) AS time_window,
    COUNT(*) AS actions_per_minute
FROM `{dataset}.game_events`
GROUP BY player_id, item_id, time_window
HAVING actions_per_minute > @min_apm
ORDER BY actions_per_minute DESC
LIMIT @limit"
    )
}

/// Centroids of the k-means behavior model, busiest cluster first.
pub fn cluster_stats(dataset: &str) -> String {
    format!(
        "SELECT
    centroid_id,
    ROUND(MAX(IF(feature = 'transaction_count', numerical_value, NULL)), 1) AS avg_transactions_per_min,
    ROUND(MAX(IF(feature = 'unique_players', numerical_value, NULL)), 1) AS avg_unique_players
FROM ML.CENTROIDS(MODEL `{dataset}.behavior_anomaly_model`)
GROUP BY centroid_id
ORDER BY avg_transactions_per_min DESC"
    )
}

/// The busiest minute for `@player_id`, as a feature row.
pub fn player_stats(dataset: &str) -> String {
    format!(
        "SELECT
    COUNT(*) AS transaction_count,
    SUM(quantity) AS total_quantity,
    1 AS unique_players,
    COALESCE(AVG(price_per_item), 0) AS avg_price
FROM `{dataset}.game_events`
WHERE player_id = @player_id
GROUP BY TIMESTAMP_TRUNC(event_timestamp, MINUTE)
ORDER BY transaction_count DESC
LIMIT 1"
    )
}

/// Per-minute history older than a day, the "normal behavior" the
/// autoencoder is trained on. At most `@limit` rows.
pub fn training_rows(dataset: &str) -> String {
    format!(
        "SELECT
    transaction_count,
    total_quantity,
    unique_players,
    avg_price
FROM `{dataset}.stats_per_minute`
WHERE minute_window < TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 1 DAY)
LIMIT @limit"
    )
}
