//! Catalog indexing
//!
//! Builds the catalog tree from two sources:
//!
//! 1. **Unity Catalog**: two queries against `system.information_schema`
//!    return every table and column the user can see.
//! 2. **Legacy metastore**: catalogs missing from the information schema
//!    (e.g. `hive_metastore`) are browsed object by object.
//!
//! Any step that reports an invalid operation handle aborts the whole run
//! with `Ok(None)`; the caller then falls back to its last complete tree.

use crate::fetch::{fetch, query_error};
use crate::metadata_table::{Cell, MetadataError, MetadataTable};
use crate::types::short_type_code;
use crate::vendor::{metadata_columns as meta, VendorConnection, VendorCursor, VendorError};
use sqlbricks_core::error::{LEGACY_INDEX_TITLE, UNITY_INDEX_TITLE};
use sqlbricks_core::{AdapterError, Catalog, CatalogItem, Result};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::debug;

pub const UNITY_TABLES_QUERY: &str = "SELECT table_catalog, table_schema, table_name, table_type \
     FROM system.information_schema.tables";

pub const UNITY_COLUMNS_QUERY: &str =
    "SELECT table_catalog, table_schema, table_name, column_name, ordinal_position, data_type \
     FROM system.information_schema.columns";

const TABLE_CATALOG: &str = "table_catalog";
const TABLE_SCHEMA: &str = "table_schema";
const TABLE_NAME: &str = "table_name";
const TABLE_TYPE: &str = "table_type";
const COLUMN_NAME: &str = "column_name";
const ORDINAL_POSITION: &str = "ordinal_position";
const DATA_TYPE: &str = "data_type";

/// How catalog, schema, table and column names are written into
/// qualified identifiers and query names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentifierStyle {
    /// `main.sales.orders`
    #[default]
    Plain,
    /// `` `main`.`sales`.`orders` ``, safe for names with dots or spaces
    Backtick,
}

impl IdentifierStyle {
    pub const CHOICES: &'static [&'static str] = &["plain", "backtick"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "plain" => Some(Self::Plain),
            "backtick" => Some(Self::Backtick),
            _ => None,
        }
    }

    /// Quote one name part
    pub fn quote<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self {
            Self::Plain => Cow::Borrowed(name),
            Self::Backtick => Cow::Owned(format!("`{}`", name.replace('`', "``"))),
        }
    }

    /// Join quoted name parts with dots
    pub fn qualify(&self, parts: &[&str]) -> String {
        parts
            .iter()
            .map(|p| self.quote(p))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Builds catalog items; both indexing paths name things the same way
#[derive(Debug, Clone, Copy)]
struct TreeBuilder {
    style: IdentifierStyle,
}

impl TreeBuilder {
    fn column(&self, path: [&str; 3], column: &str, type_name: &str) -> CatalogItem {
        let [catalog, schema, table] = path;
        CatalogItem::new(
            self.style.qualify(&[catalog, schema, table, column]),
            self.style.quote(column),
            column,
            short_type_code(type_name),
        )
    }

    fn table(&self, path: [&str; 3], table_type: &str, columns: Vec<CatalogItem>) -> CatalogItem {
        let qualified = self.style.qualify(&path);
        CatalogItem::new(qualified.clone(), qualified, path[2], table_type).with_children(columns)
    }

    fn schema(&self, catalog: &str, schema: &str, tables: Vec<CatalogItem>) -> CatalogItem {
        let qualified = self.style.qualify(&[catalog, schema]);
        CatalogItem::new(qualified.clone(), qualified, schema, "s").with_children(tables)
    }

    fn catalog(&self, catalog: &str, schemas: Vec<CatalogItem>) -> CatalogItem {
        let quoted = self.style.quote(catalog);
        CatalogItem::new(quoted.clone(), quoted, catalog, "catalog").with_children(schemas)
    }
}

/// One indexing run over a single connection handle
pub(crate) struct CatalogIndexer<'a> {
    handle: &'a dyn VendorConnection,
    skip_legacy: bool,
    tree: TreeBuilder,
}

impl<'a> CatalogIndexer<'a> {
    pub fn new(
        handle: &'a dyn VendorConnection,
        skip_legacy: bool,
        style: IdentifierStyle,
    ) -> Self {
        Self {
            handle,
            skip_legacy,
            tree: TreeBuilder { style },
        }
    }

    /// Index everything. `Ok(None)` means the run was cancelled.
    pub async fn run(&self) -> Result<Option<Catalog>> {
        let Some((mut items, mut seen)) = self.index_unity().await? else {
            return Ok(None);
        };
        debug!("indexed {} unity catalogs", items.len());

        if self.skip_legacy {
            debug!("skipping legacy metastore indexing");
        } else {
            let Some(legacy) = self.index_legacy(&mut seen).await? else {
                return Ok(None);
            };
            debug!("indexed {} legacy catalogs", legacy.len());
            items.extend(legacy);
        }

        items.sort_by(|a, b| a.label().cmp(b.label()));
        Ok(Some(Catalog::new(items)))
    }

    async fn open_cursor(&self, title: &'static str) -> Result<Option<Box<dyn VendorCursor>>> {
        match self.handle.cursor().await {
            Ok(cursor) => Ok(Some(cursor)),
            Err(err) if err.is_cancellation() => Ok(None),
            Err(err) => Err(query_error(title, err)),
        }
    }

    async fn index_unity(&self) -> Result<Option<(Vec<CatalogItem>, HashSet<String>)>> {
        let Some(mut cursor) = self.open_cursor(UNITY_INDEX_TITLE).await? else {
            return Ok(None);
        };
        let result = self.unity_with(cursor.as_mut()).await;
        close_quietly(cursor).await;
        result
    }

    async fn unity_with(
        &self,
        cursor: &mut dyn VendorCursor,
    ) -> Result<Option<(Vec<CatalogItem>, HashSet<String>)>> {
        let title = UNITY_INDEX_TITLE;

        match cursor.execute(UNITY_TABLES_QUERY).await {
            Ok(()) => {}
            Err(err) if err.is_object_not_found() => {
                debug!("no information schema, skipping unity catalog: {}", err);
                return Ok(Some((Vec::new(), HashSet::new())));
            }
            Err(err) => return settle(Err(err), title).map(|_| None),
        }
        let wanted = [TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE];
        let Some(tables) = fetch_table(cursor, &wanted, title).await? else {
            return Ok(None);
        };
        let tables = tables
            .sort_by(&[TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME])
            .map_err(|e| shape_error(title, e))?;

        if settle(cursor.execute(UNITY_COLUMNS_QUERY).await, title)?.is_none() {
            return Ok(None);
        }
        let wanted = [
            TABLE_CATALOG,
            TABLE_SCHEMA,
            TABLE_NAME,
            COLUMN_NAME,
            ORDINAL_POSITION,
            DATA_TYPE,
        ];
        let Some(columns) = fetch_table(cursor, &wanted, title).await? else {
            return Ok(None);
        };
        let columns_by_table = columns
            .sort_by(&[TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION])
            .and_then(|c| c.group_by(&[TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME]))
            .map_err(|e| shape_error(title, e))?;

        self.build_unity(&tables, &columns_by_table)
            .map(Some)
            .map_err(|e| shape_error(title, e))
    }

    fn build_unity(
        &self,
        tables: &MetadataTable,
        columns_by_table: &std::collections::BTreeMap<Vec<Cell>, MetadataTable>,
    ) -> std::result::Result<(Vec<CatalogItem>, HashSet<String>), MetadataError> {
        let mut catalog_items = Vec::new();
        let mut seen = HashSet::new();
        let tables_by_schema = tables.group_by(&[TABLE_CATALOG, TABLE_SCHEMA])?;

        for catalog in tables.unique(TABLE_CATALOG)? {
            let catalog_name = catalog.as_text();
            let mut schema_items = Vec::new();

            // Keys sort by catalog first, so one catalog's schemas are contiguous
            let in_catalog = tables_by_schema
                .range(vec![catalog.clone()]..)
                .take_while(|(key, _)| key.first() == Some(&catalog));

            for (key, in_schema) in in_catalog {
                let [_, schema] = key.as_slice() else {
                    continue;
                };
                let schema_name = schema.as_text();
                let mut table_items = Vec::new();

                for row in in_schema.rows() {
                    let [_, _, table, table_type] = row.as_slice() else {
                        continue;
                    };
                    let table_name = table.as_text();
                    let path: [&str; 3] = [&catalog_name, &schema_name, &table_name];

                    let key = vec![catalog.clone(), schema.clone(), table.clone()];
                    let column_items = columns_by_table
                        .get(&key)
                        .map(|columns| {
                            columns
                                .rows()
                                .iter()
                                .filter_map(|row| match row.as_slice() {
                                    [_, _, _, name, _, data_type] => Some(self.tree.column(
                                        path,
                                        &name.as_text(),
                                        &data_type.as_text(),
                                    )),
                                    _ => None,
                                })
                                .collect()
                        })
                        .unwrap_or_default();

                    table_items.push(self.tree.table(path, &table_type.as_text(), column_items));
                }
                schema_items.push(self.tree.schema(&catalog_name, &schema_name, table_items));
            }

            catalog_items.push(self.tree.catalog(&catalog_name, schema_items));
            seen.insert(catalog_name.into_owned());
        }

        Ok((catalog_items, seen))
    }

    async fn index_legacy(&self, seen: &mut HashSet<String>) -> Result<Option<Vec<CatalogItem>>> {
        let Some(mut cursor) = self.open_cursor(LEGACY_INDEX_TITLE).await? else {
            return Ok(None);
        };
        let result = self.legacy_with(cursor.as_mut(), seen).await;
        close_quietly(cursor).await;
        result
    }

    async fn legacy_with(
        &self,
        cursor: &mut dyn VendorCursor,
        seen: &mut HashSet<String>,
    ) -> Result<Option<Vec<CatalogItem>>> {
        let title = LEGACY_INDEX_TITLE;

        if settle(cursor.catalogs().await, title)?.is_none() {
            return Ok(None);
        }
        let Some(catalogs) = fetch_sorted(cursor, &[meta::TABLE_CAT], meta::TABLE_CAT, title).await?
        else {
            return Ok(None);
        };

        let mut catalog_items = Vec::new();
        for catalog in text_column(&catalogs, meta::TABLE_CAT, title)? {
            if !seen.insert(catalog.clone()) {
                continue;
            }
            debug!("browsing legacy catalog {}", catalog);

            if settle(cursor.schemas(&catalog).await, title)?.is_none() {
                return Ok(None);
            }
            let Some(schemas) =
                fetch_sorted(cursor, &[meta::TABLE_SCHEM], meta::TABLE_SCHEM, title).await?
            else {
                return Ok(None);
            };

            let mut schema_items = Vec::new();
            for schema in text_column(&schemas, meta::TABLE_SCHEM, title)? {
                let Some(table_items) = self.legacy_tables(cursor, &catalog, &schema).await? else {
                    return Ok(None);
                };
                schema_items.push(self.tree.schema(&catalog, &schema, table_items));
            }
            catalog_items.push(self.tree.catalog(&catalog, schema_items));
        }

        Ok(Some(catalog_items))
    }

    async fn legacy_tables(
        &self,
        cursor: &mut dyn VendorCursor,
        catalog: &str,
        schema: &str,
    ) -> Result<Option<Vec<CatalogItem>>> {
        let title = LEGACY_INDEX_TITLE;

        if settle(cursor.tables(catalog, schema).await, title)?.is_none() {
            return Ok(None);
        }
        // Schema and table arguments are LIKE patterns, so `a_b` also matches `axb`
        let schema_cell = Cell::text(schema);
        let wanted = [meta::TABLE_SCHEM, meta::TABLE_NAME, meta::TABLE_TYPE];
        let Some(tables) = fetch_sorted(cursor, &wanted, meta::TABLE_NAME, title).await? else {
            return Ok(None);
        };
        let tables = tables
            .filter_eq(&[(meta::TABLE_SCHEM, &schema_cell)])
            .map_err(|e| shape_error(title, e))?;

        let mut table_items = Vec::new();
        for row in tables.rows() {
            let [_, table_cell, table_type] = row.as_slice() else {
                continue;
            };
            let table = table_cell.as_text();
            let path: [&str; 3] = [catalog, schema, &table];

            if settle(cursor.columns(catalog, schema, &table).await, title)?.is_none() {
                return Ok(None);
            }
            let wanted = [
                meta::TABLE_SCHEM,
                meta::TABLE_NAME,
                meta::COLUMN_NAME,
                meta::TYPE_NAME,
                meta::ORDINAL_POSITION,
            ];
            let Some(columns) = fetch_sorted(cursor, &wanted, meta::ORDINAL_POSITION, title).await?
            else {
                return Ok(None);
            };
            let columns = columns
                .filter_eq(&[(meta::TABLE_SCHEM, &schema_cell), (meta::TABLE_NAME, table_cell)])
                .map_err(|e| shape_error(title, e))?;

            let column_items = columns
                .rows()
                .iter()
                .filter_map(|row| match row.as_slice() {
                    [_, _, name, type_name, _] => {
                        Some(self.tree.column(path, &name.as_text(), &type_name.as_text()))
                    }
                    _ => None,
                })
                .collect();

            table_items.push(self.tree.table(path, &table_type.as_text(), column_items));
        }

        Ok(Some(table_items))
    }
}

/// Map a vendor call outcome: `Some(())` on success, `None` when cancelled
fn settle(
    outcome: std::result::Result<(), VendorError>,
    title: &'static str,
) -> Result<Option<()>> {
    match outcome {
        Ok(()) => Ok(Some(())),
        Err(err) if err.is_cancellation() => {
            debug!("indexing cancelled: {}", err);
            Ok(None)
        }
        Err(err) => Err(query_error(title, err)),
    }
}

async fn fetch_table(
    cursor: &mut dyn VendorCursor,
    wanted: &[&str],
    title: &'static str,
) -> Result<Option<MetadataTable>> {
    let Some(batch) = fetch(cursor, None, title).await? else {
        return Ok(None);
    };
    MetadataTable::from_batch(&batch, wanted)
        .map(Some)
        .map_err(|e| shape_error(title, e))
}

async fn fetch_sorted(
    cursor: &mut dyn VendorCursor,
    wanted: &[&str],
    sort_key: &str,
    title: &'static str,
) -> Result<Option<MetadataTable>> {
    match fetch_table(cursor, wanted, title).await? {
        Some(table) => table
            .sort_by(&[sort_key])
            .map(Some)
            .map_err(|e| shape_error(title, e)),
        None => Ok(None),
    }
}

fn text_column(table: &MetadataTable, column: &str, title: &'static str) -> Result<Vec<String>> {
    let cells = table.column(column).map_err(|e| shape_error(title, e))?;
    Ok(cells.into_iter().map(|c| c.as_text().into_owned()).collect())
}

fn shape_error(title: &'static str, err: MetadataError) -> AdapterError {
    AdapterError::query(title, err.to_string()).with_source(err)
}

async fn close_quietly(mut cursor: Box<dyn VendorCursor>) {
    if let Err(err) = cursor.close().await {
        debug!("closing metadata cursor failed: {}", err);
    }
}
