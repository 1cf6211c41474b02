// Catalog
pub mod categories;
pub mod products;

// Shopping
pub mod carts;
pub mod favorites;
pub mod orders;
pub mod payments;

// Accounts
pub mod password_reset;
pub mod users;

// After-sale
pub mod invoices;
pub mod reviews;

// Outbound mail
pub mod email;

// Admin and discovery
pub mod recommendations;
pub mod statistics;

use sea_orm::sea_query::LikeExpr;

const LIKE_ESCAPE: char = '!';

/// Case-folded `%term%` pattern that matches `%` and `_` literally.
pub(crate) fn contains_pattern(term: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape(LIKE_ESCAPE)
}
