// src/notify/digest.rs
//! Markdown rendering of review digests.

use std::fmt::Write as _;

use crate::reviews::Review;

pub const NEW_REVIEWS_HEADER: &str = "## You have new reviews:\n";
pub const UPDATED_REVIEWS_HEADER: &str = "## Some reviews have been updated:\n";

/// Five glyphs: filled stars first, then empty ones.
pub fn star_glyphs(stars: u8) -> String {
    let filled = usize::from(stars.min(5));
    ":star:".repeat(filled) + &":new_moon:".repeat(5 - filled)
}

/// One review block; multi-line bodies stay inside the quote.
pub fn format_review(review: &Review) -> String {
    format!(
        "#### **{}** commented ({}):\n>{}\n\non _{}_\nReviewId:**{}**\n",
        review.author,
        star_glyphs(review.stars),
        review.text.split('\n').collect::<Vec<_>>().join("\n>"),
        review.modified,
        review.id
    )
}

/// Header, one block per shown review, and a truncation note when `hidden > 0`.
pub fn render_digest(header: &str, shown: &[Review], hidden: usize) -> String {
    let mut out = String::from(header);
    for review in shown {
        out.push_str(&format_review(review));
    }
    if hidden > 0 {
        let _ = write!(out, "and {hidden} more not shown.");
    }
    out
}

pub fn render_test_alert(alert_name: &str, review: &Review) -> String {
    format!("Test alert for alert named {alert_name}\n{}", format_review(review))
}
