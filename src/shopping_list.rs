use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::{
    actions::list_shopping_cart_lines,
    constants::SHOPPING_LIST_SUFFIX,
    error::{Error, HtmlError},
    schema::{Id, ShoppingCartLine},
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One purchase line of the exported shopping list.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListRow {
    pub name: String,
    pub amount: i64,
    pub measurement_unit: String,
}

/// Sums cart lines per `(name, unit)`. Rows come out sorted by name, then unit.
pub fn aggregate(lines: impl IntoIterator<Item = ShoppingCartLine>) -> Vec<ShoppingListRow> {
    let mut groups: BTreeMap<(String, String), i64> = BTreeMap::new();
    for line in lines {
        *groups
            .entry((line.name, line.measurement_unit))
            .or_insert(0) += i64::from(line.amount);
    }

    groups
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListRow {
            name,
            amount,
            measurement_unit,
        })
        .collect()
}

/// `name,amount,unit` rows behind a UTF-8 byte order mark, no header line.
pub fn render_csv(rows: &[ShoppingListRow]) -> Result<Vec<u8>, Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(UTF8_BOM.to_vec());

    for row in rows {
        writer
            .write_record([
                row.name.as_str(),
                row.amount.to_string().as_str(),
                row.measurement_unit.as_str(),
            ])
            .map_err(|e| {
                log::error!("Could not write shopping list row: {e}");
                HtmlError::InternalServerError.new("Could not render shopping list")
            })?;
    }

    writer.into_inner().map_err(|e| {
        log::error!("Could not flush shopping list: {e}");
        HtmlError::InternalServerError.new("Could not render shopping list")
    })
}

pub fn attachment_filename(username: &str) -> String {
    format!("{username}{SHOPPING_LIST_SUFFIX}")
}

/// Current aggregated list for a user's cart. Recomputed on every call.
pub async fn fetch_shopping_list(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingListRow>, Error> {
    let lines = list_shopping_cart_lines(user_id, pool).await?;
    Ok(aggregate(lines))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn line(name: &str, amount: i32, unit: &str) -> ShoppingCartLine {
        ShoppingCartLine {
            name: name.to_owned(),
            measurement_unit: unit.to_owned(),
            amount,
        }
    }

    fn row(name: &str, amount: i64, unit: &str) -> ShoppingListRow {
        ShoppingListRow {
            name: name.to_owned(),
            amount,
            measurement_unit: unit.to_owned(),
        }
    }

    #[fixture]
    fn two_recipe_cart() -> Vec<ShoppingCartLine> {
        vec![
            line("flour", 200, "g"),
            line("egg", 2, "pcs"),
            line("flour", 100, "g"),
            line("milk", 1, "cup"),
        ]
    }

    #[rstest]
    fn merges_lines_across_recipes(two_recipe_cart: Vec<ShoppingCartLine>) {
        assert_eq!(
            aggregate(two_recipe_cart),
            vec![row("egg", 2, "pcs"), row("flour", 300, "g"), row("milk", 1, "cup")]
        );
    }

    #[rstest]
    fn recomputing_gives_same_list(two_recipe_cart: Vec<ShoppingCartLine>) {
        assert_eq!(aggregate(two_recipe_cart.clone()), aggregate(two_recipe_cart));
    }

    #[test]
    fn empty_cart_is_empty_list() {
        assert!(aggregate(vec![]).is_empty());
    }

    #[test]
    fn units_are_kept_apart() {
        let rows = aggregate(vec![
            line("sugar", 1, "cup"),
            line("sugar", 50, "g"),
            line("sugar", 2, "cup"),
        ]);

        assert_eq!(rows, vec![row("sugar", 3, "cup"), row("sugar", 50, "g")]);
    }

    #[test]
    fn large_totals_do_not_overflow() {
        let rows = aggregate(vec![line("salt", i32::MAX, "g"), line("salt", i32::MAX, "g")]);
        assert_eq!(rows[0].amount, 2 * i64::from(i32::MAX));
    }

    #[rstest]
    fn csv_has_bom_and_no_header(two_recipe_cart: Vec<ShoppingCartLine>) {
        let bytes = render_csv(&aggregate(two_recipe_cart)).unwrap();

        assert!(bytes.starts_with(UTF8_BOM));
        let body = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(body, "egg,2,pcs\nflour,300,g\nmilk,1,cup\n");
    }

    #[test]
    fn csv_quotes_names_with_commas() {
        let bytes = render_csv(&[row("salt, coarse", 5, "g")]).unwrap();
        let body = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(body, "\"salt, coarse\",5,g\n");
    }

    #[test]
    fn empty_list_is_only_bom() {
        assert_eq!(render_csv(&[]).unwrap(), UTF8_BOM.to_vec());
    }

    #[test]
    fn filename_is_per_user() {
        assert_eq!(attachment_filename("chef"), "chef_shopping_list.csv");
    }
}
