use sqlx::Row;

fn database_url() -> String {
    dotenvy::dotenv().ok();

    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            return url;
        }
    }

    let server = std::env::var("POSTGRES_SERVER").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".into());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "physexam".into());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();
    let db = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "physexam".into());

    format!("postgresql://{user}:{password}@{server}:{port}/{db}")
}

#[tokio::test]
#[ignore = "requires a running Postgres database"]
async fn migrations_apply_and_seed_templates() -> anyhow::Result<()> {
    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url()).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    for table in ["users", "problem_templates", "user_responses"] {
        let row = sqlx::query("SELECT to_regclass($1)::text").bind(table).fetch_one(&pool).await?;
        let regclass: Option<String> = row.try_get(0)?;
        assert!(regclass.is_some(), "expected table {table} to exist after migrations");
    }

    let templates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM problem_templates")
        .fetch_one(&pool)
        .await?;
    assert!(templates >= 7, "expected seeded templates, found {templates}");

    let multi_answer: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM problem_templates WHERE answer_count > 1",
    )
    .fetch_one(&pool)
    .await?;
    assert!(multi_answer >= 4);

    Ok(())
}
