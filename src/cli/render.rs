//! Table rendering for CLI output

use crate::database::profile::ConnectionProfile;
use crate::database::result::{QueryResult, ResultPage, Row};
use crate::database::schema::{ColumnDescriptor, RelationNode, SchemaNode};
use crate::query::QueryHistory;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn row_cells(row: &Row) -> Vec<String> {
    row.values().map(|v| v.to_string()).collect()
}

fn result_table<'a>(result: &QueryResult, rows: impl IntoIterator<Item = &'a Row>) -> Table {
    let mut table = table();
    table.set_header(
        result
            .fields
            .iter()
            .map(|f| format!("{}\n{}", f.name, f.data_type)),
    );
    for row in rows {
        table.add_row(row_cells(row));
    }
    table
}

/// Render a fresh query result, showing its first page
pub fn result(result: &QueryResult, page_size: usize) -> String {
    let elapsed = result.duration.as_millis();

    if !result.returns_rows() {
        return format!(
            "{} ({} rows affected, {} ms)",
            result.command, result.row_count, elapsed
        );
    }

    let first = result.page(0, page_size);
    let mut out = result_table(result, first.rows).to_string();
    out.push_str(&format!("\n({} rows, {} ms)", result.row_count, elapsed));
    if first.total_pages > 1 {
        out.push_str(&format!(
            "\nPage 1 of {}. Use /page <n> to see more.",
            first.total_pages
        ));
    }
    out
}

/// Render one page of a result
pub fn page(result: &QueryResult, page: &ResultPage<'_>) -> String {
    format!(
        "{}\nPage {} of {}",
        result_table(result, page.rows),
        page.index + 1,
        page.total_pages
    )
}

/// Render a subset of a result's rows
pub fn rows(result: &QueryResult, rows: &[&Row]) -> String {
    if rows.is_empty() {
        return "No matching rows".to_string();
    }
    format!(
        "{}\n({} matching rows)",
        result_table(result, rows.iter().copied()),
        rows.len()
    )
}

pub fn schemas(schemas: &[SchemaNode]) -> String {
    if schemas.is_empty() {
        return "No schemas".to_string();
    }
    let mut table = table();
    table.set_header(vec!["Schema"]);
    for schema in schemas {
        table.add_row(vec![schema.name.to_string()]);
    }
    table.to_string()
}

pub fn relations(relations: &[RelationNode]) -> String {
    if relations.is_empty() {
        return "No tables or views".to_string();
    }
    let mut table = table();
    table.set_header(vec!["Name", "Kind"]);
    for relation in relations {
        table.add_row(vec![relation.name.clone(), relation.kind.label().to_string()]);
    }
    table.to_string()
}

pub fn columns(columns: &[ColumnDescriptor]) -> String {
    if columns.is_empty() {
        return "No columns".to_string();
    }
    let mut table = table();
    table.set_header(vec!["Column", "Type", "Nullable", "Key", "Default"]);
    for column in columns {
        table.add_row(vec![
            column.name.clone(),
            column
                .declared_type
                .clone()
                .unwrap_or_else(|| column.data_type.clone()),
            if column.nullable { "YES" } else { "NO" }.to_string(),
            if column.is_primary_key { "PK" } else { "" }.to_string(),
            column.default_expression.clone().unwrap_or_default(),
        ]);
    }
    table.to_string()
}

pub fn profiles(profiles: &[ConnectionProfile]) -> String {
    if profiles.is_empty() {
        return "No saved profiles. Use /save <name> <url> to add one.".to_string();
    }
    let mut table = table();
    table.set_header(vec!["Name", "Target", "TLS", "Last used", "Id"]);
    for profile in profiles {
        table.add_row(vec![
            profile.name.clone(),
            profile.display_target(),
            if profile.use_tls { "yes" } else { "no" }.to_string(),
            profile
                .last_used_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string()),
            profile.id.clone(),
        ]);
    }
    table.to_string()
}

pub fn history(history: &QueryHistory) -> String {
    if history.is_empty() {
        return "No queries yet".to_string();
    }
    let mut table = table();
    table.set_header(vec!["#", "Executed", "Query"]);
    for (i, entry) in history.entries().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            entry.executed_at.format("%H:%M:%S").to_string(),
            entry.query.clone(),
        ]);
    }
    table.to_string()
}
