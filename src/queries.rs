//! SQL templates for the five dashboard modes. Everything interesting runs
//! remotely; these functions only splice the configured `DB.SCHEMA`
//! namespace (and, for the analyst mode, escaped user text) into fixed
//! statements.

/// Doubles single quotes so user text can sit inside a SQL string literal.
pub fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}

/// Cortex Analyst call over the staged semantic model. The response lands in
/// a single `RESPONSE` column as a JSON document.
pub fn analyst_query(ns: &str, question: &str) -> String {
    let question = escape_literal(question);
    format!(
        "SELECT SNOWFLAKE.CORTEX.ANALYST(
            '@{ns}.SEMANTIC_MODELS/04_semantic_model.yaml',
            '{question}'
        ) AS RESPONSE"
    )
}

/// Most recent reviews with a sentiment score attached by the warehouse.
pub fn sentiment_query(ns: &str, limit: usize) -> String {
    format!(
        "SELECT
            review_id,
            overall_rating,
            review_text,
            ROUND(SNOWFLAKE.CORTEX.SENTIMENT(review_text), 3) AS sentiment_score
        FROM {ns}.FACT_REVIEW
        WHERE review_text IS NOT NULL
        ORDER BY review_date DESC
        LIMIT {limit}"
    )
}

/// (Re)trains the forecast model over the daily sales fact table.
pub fn forecast_create(ns: &str) -> String {
    format!(
        "CREATE OR REPLACE SNOWFLAKE.ML.FORECAST demo_forecast(
            INPUT_DATA => SYSTEM$REFERENCE('TABLE', '{ns}.FACT_DAILY_SALES'),
            TIMESTAMP_COLNAME => 'SALES_DATE',
            TARGET_COLNAME => 'TOTAL_REVENUE',
            SERIES_COLNAME => 'LOCATION_ID'
        )"
    )
}

/// Runs the trained model as a table function and joins location names, all
/// in one statement. Each statement goes out as its own REST request, so the
/// forecast cannot rely on `RESULT_SCAN(LAST_QUERY_ID())` seeing an earlier
/// `CALL` the way a long-lived session would.
pub fn forecast_query(ns: &str, days: u32) -> String {
    format!(
        "SELECT
            l.location_name,
            f.ts AS forecast_date,
            f.forecast,
            f.lower_bound,
            f.upper_bound
        FROM TABLE(demo_forecast!FORECAST(FORECASTING_PERIODS => {days})) f
        JOIN {ns}.DIM_LOCATION l
            ON f.series::INT = l.location_id
        ORDER BY l.location_name, f.ts"
    )
}

/// Raw recency/frequency/monetary per customer. Segment bucketing happens
/// client-side (see `insights::Segment`).
pub fn rfm_query(ns: &str, limit: usize) -> String {
    format!(
        "WITH rfm AS (
            SELECT
                c.customer_id,
                c.first_name || ' ' || c.last_name AS customer_name,
                c.email,
                DATEDIFF(DAY, MAX(o.order_timestamp), CURRENT_DATE()) AS recency,
                COUNT(*) AS frequency,
                SUM(o.total_amount) AS monetary
            FROM {ns}.DIM_CUSTOMER c
            JOIN {ns}.FACT_ORDER o ON c.customer_id = o.customer_id
            GROUP BY c.customer_id, c.first_name, c.last_name, c.email
        )
        SELECT
            customer_name,
            email,
            recency AS days_since_last_order,
            frequency AS total_orders,
            ROUND(monetary, 2) AS lifetime_value
        FROM rfm
        ORDER BY monetary DESC
        LIMIT {limit}"
    )
}

pub fn today_kpis(ns: &str) -> String {
    format!(
        "SELECT
            COUNT(DISTINCT order_id) AS orders_today,
            ROUND(SUM(total_amount), 2) AS revenue_today,
            ROUND(AVG(total_amount), 2) AS avg_order
        FROM {ns}.FACT_ORDER
        WHERE DATE(order_timestamp) = CURRENT_DATE()"
    )
}

pub fn location_revenue(ns: &str, days: u32) -> String {
    format!(
        "SELECT
            l.location_name,
            COUNT(DISTINCT o.order_id) AS orders,
            ROUND(SUM(o.total_amount), 2) AS revenue
        FROM {ns}.FACT_ORDER o
        JOIN {ns}.DIM_LOCATION l ON o.location_id = l.location_id
        WHERE DATE(o.order_timestamp) >= DATEADD(DAY, -{days}, CURRENT_DATE())
        GROUP BY l.location_name
        ORDER BY revenue DESC"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "PIZZERIA_DEMO.BELLA_NAPOLI";

    #[test]
    fn escape_literal_doubles_quotes() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("O'Brien's order"), "O''Brien''s order");
    }

    #[test]
    fn analyst_query_embeds_escaped_question() {
        let sql = analyst_query(NS, "What's our best pizza?");
        assert!(sql.contains("SNOWFLAKE.CORTEX.ANALYST"));
        assert!(
            sql.contains("'@PIZZERIA_DEMO.BELLA_NAPOLI.SEMANTIC_MODELS/04_semantic_model.yaml'")
        );
        assert!(sql.contains("What''s our best pizza?"));
        assert!(!sql.contains("What's"));
    }

    #[test]
    fn sentiment_query_filters_and_limits() {
        let sql = sentiment_query(NS, 20);
        assert!(sql.contains("SNOWFLAKE.CORTEX.SENTIMENT(review_text)"));
        assert!(sql.contains("FROM PIZZERIA_DEMO.BELLA_NAPOLI.FACT_REVIEW"));
        assert!(sql.contains("WHERE review_text IS NOT NULL"));
        assert!(sql.ends_with("LIMIT 20"));
    }

    #[test]
    fn forecast_statements_reference_model_and_horizon() {
        assert!(forecast_create(NS).contains("PIZZERIA_DEMO.BELLA_NAPOLI.FACT_DAILY_SALES"));
        let sql = forecast_query(NS, 14);
        assert!(sql.contains("TABLE(demo_forecast!FORECAST(FORECASTING_PERIODS => 14))"));
        assert!(sql.contains("PIZZERIA_DEMO.BELLA_NAPOLI.DIM_LOCATION"));
    }

    #[test]
    fn forecast_read_back_is_a_single_statement() {
        // Statements run as independent REST requests; the read-back must
        // not lean on query history from a previous request.
        let sql = forecast_query(NS, 14);
        assert!(!sql.contains("RESULT_SCAN"));
        assert!(!sql.contains("LAST_QUERY_ID"));
        assert!(!sql.contains(';'));
    }

    #[test]
    fn rfm_query_returns_raw_measures() {
        let sql = rfm_query(NS, 50);
        assert!(sql.contains("DATEDIFF(DAY, MAX(o.order_timestamp), CURRENT_DATE())"));
        assert!(sql.ends_with("LIMIT 50"));
        // Bucketing is client-side; the statement must not label segments.
        assert!(!sql.contains("CASE"));
    }

    #[test]
    fn dashboard_queries_scope_to_namespace() {
        assert!(today_kpis(NS).contains("FROM PIZZERIA_DEMO.BELLA_NAPOLI.FACT_ORDER"));
        let sql = location_revenue(NS, 7);
        assert!(sql.contains("DATEADD(DAY, -7, CURRENT_DATE())"));
        assert!(sql.contains("GROUP BY l.location_name"));
    }
}
