//! Catalog CSV export and import for the admin back-office.
//!
//! The format is a plain comma-separated file without quoting. Commas in
//! text fields are written as semicolons; the description gets its commas
//! back on import.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::Product;
use crate::storage::{NewProduct, ProductPatch};
use crate::{EcommerceError, Result};

pub const EXPORT_HEADER: &str = "ID,Название,Описание,Цена,Категория,Остаток,Скидка%,ОригинальнаяЦена,Изображение";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Column {
    Id,
    Name,
    Description,
    Price,
    Category,
    Stock,
    Discount,
    OriginalPrice,
    Image,
}

impl Column {
    fn from_header(name: &str) -> Option<Self> {
        let key: String = name.trim().to_lowercase().chars().filter(|c| !c.is_whitespace() && *c != '_').collect();
        match key.as_str() {
            "id" => Some(Self::Id),
            "название" | "name" => Some(Self::Name),
            "описание" | "description" => Some(Self::Description),
            "цена" | "price" => Some(Self::Price),
            "категория" | "category" => Some(Self::Category),
            "остаток" | "stock" => Some(Self::Stock),
            "скидка%" | "discount%" | "discount" | "discountpercent" => Some(Self::Discount),
            "оригинальнаяцена" | "originalprice" => Some(Self::OriginalPrice),
            "изображение" | "image" | "imageurl" => Some(Self::Image),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum RowAction {
    Create(NewProduct),
    Update(Uuid, ProductPatch),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ParsedCatalog {
    pub rows: Vec<(usize, RowAction)>,
    pub errors: Vec<RowError>,
}

fn flatten(text: &str) -> String {
    text.replace(',', ";").replace(['\r', '\n'], " ")
}

pub fn export(products: &[Product]) -> String {
    let mut out = String::with_capacity(64 * (products.len() + 1));
    out.push_str(EXPORT_HEADER);
    out.push('\n');
    for p in products {
        let row = [
            p.id.to_string(),
            flatten(&p.name),
            flatten(&p.description),
            p.price.to_string(),
            p.category.as_deref().map(flatten).unwrap_or_default(),
            p.stock.to_string(),
            p.discount_percent.to_string(),
            p.original_price.map(|d| d.to_string()).unwrap_or_default(),
            p.image_url.as_deref().map(flatten).unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

struct Fields<'a> {
    columns: &'a [Option<Column>],
    values: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn get(&self, column: Column) -> Option<&'a str> {
        self.columns
            .iter()
            .position(|c| *c == Some(column))
            .map(|i| self.values[i].trim())
            .filter(|v| !v.is_empty())
    }

    fn decimal(&self, column: Column, label: &str) -> std::result::Result<Option<Decimal>, String> {
        match self.get(column) {
            Some(v) => {
                let d = Decimal::from_str(&v.replace(' ', "")).map_err(|_| format!("{} is not a number: {}", label, v))?;
                if d.is_sign_negative() && !d.is_zero() {
                    return Err(format!("{} must not be negative", label));
                }
                Ok(Some(d))
            }
            None => Ok(None),
        }
    }
}

fn parse_row(columns: &[Option<Column>], line: &str) -> std::result::Result<RowAction, String> {
    let values: Vec<&str> = line.split(',').collect();
    if values.len() != columns.len() {
        return Err(format!("expected {} columns, found {}", columns.len(), values.len()));
    }
    let f = Fields { columns, values };

    let id = match f.get(Column::Id) {
        Some(v) => Some(Uuid::parse_str(v).map_err(|_| format!("invalid ID: {}", v))?),
        None => None,
    };
    let name = f.get(Column::Name).ok_or("name is required")?.to_string();
    let price = f.decimal(Column::Price, "price")?.ok_or("price is required")?;
    let description = f.get(Column::Description).map(|d| d.replace(';', ",")).unwrap_or_default();
    let stock = match f.get(Column::Stock) {
        Some(v) => v.parse::<u32>().map_err(|_| format!("stock is not a whole number: {}", v))?,
        None => 0,
    };
    let discount_percent = match f.get(Column::Discount) {
        Some(v) => v.trim_end_matches('%').parse::<i32>().map_err(|_| format!("discount is not a whole number: {}", v))?,
        None => 0,
    };
    if !(0..=100).contains(&discount_percent) {
        return Err(format!("discount must be between 0 and 100: {}", discount_percent));
    }
    let original_price = f.decimal(Column::OriginalPrice, "original price")?;
    let category = f.get(Column::Category).map(str::to_string);
    let image_url = f.get(Column::Image).map(str::to_string);

    Ok(match id {
        Some(id) => RowAction::Update(
            id,
            ProductPatch {
                name: Some(name),
                description: Some(description),
                price: Some(price),
                original_price: Some(original_price),
                discount_percent: Some(discount_percent),
                category: Some(category),
                stock: Some(stock),
                image_url: Some(image_url),
                is_active: None,
            },
        ),
        None => RowAction::Create(NewProduct {
            name,
            description,
            price,
            original_price,
            discount_percent,
            category,
            stock,
            image_url,
            variants: Vec::new(),
        }),
    })
}

/// Parses an uploaded catalog. A bad header fails the whole import; bad
/// rows are collected in [`ParsedCatalog::errors`] with their line number.
pub fn parse(text: &str) -> Result<ParsedCatalog> {
    let mut lines = text.trim_start_matches('\u{feff}').lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or_else(|| EcommerceError::validation("CSV file is empty"))?;
    let columns: Vec<Option<Column>> = header.split(',').map(Column::from_header).collect();
    for required in [Column::Name, Column::Price] {
        if !columns.contains(&Some(required)) {
            return Err(EcommerceError::validation(format!("CSV header is missing the {:?} column", required)));
        }
    }

    let mut parsed = ParsedCatalog::default();
    for (index, line) in lines {
        let line_no = index + 1;
        match parse_row(&columns, line.trim_end_matches('\r')) {
            Ok(action) => parsed.rows.push((line_no, action)),
            Err(message) => parsed.errors.push(RowError { line: line_no, message }),
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(description: &str) -> Product {
        Product {
            id: Uuid::now_v7(), name: "Mug".into(), description: description.into(), price: Decimal::new(45050, 2),
            original_price: Some(Decimal::new(500, 0)), discount_percent: 10, category: Some("Kitchen".into()), stock: 7,
            image_url: None, is_active: true, variants: vec![], created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_export_round_trips_description_commas() {
        let p = product("Big, white, ceramic");
        let csv = export(&[p.clone()]);
        assert!(csv.starts_with(EXPORT_HEADER));
        assert!(csv.contains("Big; white; ceramic"));

        let parsed = parse(&csv).unwrap();
        assert!(parsed.errors.is_empty());
        match &parsed.rows[0].1 {
            RowAction::Update(id, patch) => {
                assert_eq!(*id, p.id);
                assert_eq!(patch.description.as_deref(), Some("Big, white, ceramic"));
                assert_eq!(patch.price, Some(p.price));
                assert_eq!(patch.stock, Some(7));
                assert_eq!(patch.image_url, Some(None));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_english_header_without_id_creates() {
        let csv = "Name,Description,Price,Category,Stock\nKettle,Steel,1200,Kitchen,3\n";
        let parsed = parse(csv).unwrap();
        match &parsed.rows[0].1 {
            RowAction::Create(p) => {
                assert_eq!(p.name, "Kettle");
                assert_eq!(p.price, Decimal::new(1200, 0));
                assert_eq!(p.stock, 3);
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_rows_reported_with_line_numbers() {
        let csv = "ID,Name,Price,Stock\n,Good,10,1\n,NoPrice,,1\nnot-a-uuid,Bad,10,1\n,Short,10\n";
        let parsed = parse(csv).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        let lines: Vec<usize> = parsed.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
    }

    #[test]
    fn test_missing_price_column_rejects_file() {
        assert!(parse("Name,Stock\nMug,1\n").is_err());
        assert!(parse("").is_err());
    }
}
