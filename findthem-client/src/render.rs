//! HTML presentation adapter
//!
//! Pure functions from display state to markup fragments. Every user-supplied
//! string goes through [`escape_html`]; image references go through
//! [`image_url`], which always yields something displayable.

use crate::matches::{RankedMatch, SearchState, DISPLAY_FLOOR_PERCENT};
use crate::model::{Case, CaseStatus, Statistics};
use chrono::{DateTime, NaiveDateTime};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::Write;

/// Characters left alone by `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Inline "No Image" placeholder
pub const PLACEHOLDER_IMAGE: &str = "data:image/svg+xml,%3Csvg xmlns=%22http://www.w3.org/2000/svg%22 width=%22320%22 height=%22250%22%3E%3Crect fill=%22%23e5e7eb%22 width=%22320%22 height=%22250%22/%3E%3Ctext x=%2250%25%22 y=%2250%25%22 dominant-baseline=%22middle%22 text-anchor=%22middle%22 font-family=%22Arial%22 font-size=%2214%22 fill=%22%236b7280%22%3ENo Image%3C/text%3E%3C/svg%3E";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// URL for a stored image path.
///
/// Absolute http(s) URLs are kept. Otherwise the final path segment (after
/// normalizing `\` to `/`) is percent-encoded under `uploads_base`. No usable
/// path yields [`PLACEHOLDER_IMAGE`].
pub fn image_url(uploads_base: &str, image_path: Option<&str>) -> String {
    let path = match image_path.map(str::trim) {
        Some(path) if !path.is_empty() => path,
        _ => return PLACEHOLDER_IMAGE.to_string(),
    };

    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    let normalized = path.replace('\\', "/");
    match normalized.rsplit('/').next() {
        Some(file_name) if !file_name.is_empty() => format!(
            "{}/{}",
            uploads_base.trim_end_matches('/'),
            utf8_percent_encode(file_name, URI_COMPONENT)
        ),
        _ => PLACEHOLDER_IMAGE.to_string(),
    }
}

fn image_tag(src: &str, alt: &str, class: &str) -> String {
    format!(
        r#"<img src="{}" alt="{}" class="{}" onerror="this.onerror=null;this.src='{}'">"#,
        escape_html(src),
        escape_html(alt),
        class,
        PLACEHOLDER_IMAGE
    )
}

fn status_label(status: CaseStatus) -> (&'static str, &'static str) {
    match status {
        CaseStatus::Missing => ("status-missing", "MISSING"),
        CaseStatus::Found => ("status-found", "FOUND"),
    }
}

/// Render the search panel. Each call produces the complete panel content.
pub fn render_search(state: &SearchState, uploads_base: &str) -> String {
    match state {
        SearchState::Idle => String::new(),
        SearchState::Searching => {
            r#"<div class="search-status">Searching for similar faces...</div>"#.to_string()
        }
        SearchState::NoResults => format!(
            r#"<div class="no-results"><h3>No matches found</h3><p>No case reached {}% similarity. Try a clearer, front-facing photo.</p></div>"#,
            DISPLAY_FLOOR_PERCENT
        ),
        SearchState::Results(matches) => render_results(matches, uploads_base),
    }
}

fn render_results(matches: &[RankedMatch], uploads_base: &str) -> String {
    let count = if matches.len() == 1 {
        "<strong>1 potential match</strong>".to_string()
    } else {
        format!("<strong>{} potential matches</strong>", matches.len())
    };

    let mut html = format!(
        r#"<div class="match-banner">Found {} with {}%+ similarity</div>"#,
        count, DISPLAY_FLOOR_PERCENT
    );
    html.push_str(r#"<div class="results-list">"#);
    for ranked in matches {
        html.push_str(&render_result_card(ranked, uploads_base));
    }
    html.push_str("</div>");
    html
}

fn render_result_card(ranked: &RankedMatch, uploads_base: &str) -> String {
    let m = &ranked.candidate;
    let (status_class, status_text) = status_label(m.status);
    let bar_width = m.similarity_percentage.clamp(0.0, 100.0);

    let mut html = String::new();
    // write! into a String cannot fail
    let _ = write!(
        html,
        concat!(
            r#"<div class="result-card">"#,
            r#"<div class="result-image-container">{image}<span class="result-badge">#{rank} Match</span></div>"#,
            r#"<div class="result-content">"#,
            r#"<div class="result-header"><div class="result-name">{name}</div><span class="result-status {status_class}">{status_text}</span></div>"#,
            r#"<div class="result-similarity"><div class="similarity-label">Match Confidence ({tier})</div>"#,
            r#"<div class="similarity-bar"><div class="similarity-fill" style="width: {bar}%"></div></div>"#,
            r#"<div class="result-score">{score}% Match</div></div>"#,
            r#"<div class="result-details"><strong>Contact:</strong><br>{contact}</div>"#,
            r#"<div class="result-details"><strong>Details:</strong><br>{description}</div>"#,
            r#"</div></div>"#
        ),
        image = image_tag(&image_url(uploads_base, m.image_path.as_deref()), &m.name, "result-image"),
        rank = ranked.rank,
        name = escape_html(&m.name),
        status_class = status_class,
        status_text = status_text,
        tier = ranked.tier,
        bar = bar_width,
        score = m.similarity_percentage,
        contact = escape_html(&m.contact),
        description = escape_html(&m.description),
    );
    html
}

/// "Mar 1, 2024 at 10:15 AM" when parseable, otherwise the raw value
pub fn format_reported_at(created_at: Option<&str>) -> String {
    let Some(raw) = created_at else {
        return "Unknown date".to_string();
    };

    const DISPLAY: &str = "%b %-d, %Y at %I:%M %p";
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(DISPLAY).to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format(DISPLAY).to_string();
    }
    raw.to_string()
}

/// Public case cards with a "find similar" action per case
pub fn render_case_cards(cases: &[Case], uploads_base: &str) -> String {
    if cases.is_empty() {
        return r#"<div class="no-cases">No cases found</div>"#.to_string();
    }

    let mut html = String::from(r#"<div class="cases-list">"#);
    for case in cases {
        let (badge_class, badge_text) = match case.status {
            CaseStatus::Missing => ("missing", "MISSING PERSON"),
            CaseStatus::Found => ("found", "FOUND PERSON"),
        };
        let _ = write!(
            html,
            concat!(
                r#"<div class="case-card" data-case-id="{id}">"#,
                r#"<div class="case-image-container">{image}<span class="case-badge {badge_class}">{badge_text}</span></div>"#,
                r#"<div class="case-content">"#,
                r#"<h3 class="case-name">{name}</h3>"#,
                r#"<p class="case-description">{description}</p>"#,
                r#"<button class="btn btn-sm btn-secondary find-similar" data-image-path="{image_path}">Find Similar</button>"#,
                r#"<div class="case-details"><span class="case-contact">{contact}</span><span class="case-date">{date}</span></div>"#,
                r#"</div></div>"#
            ),
            id = case.case_id,
            image = image_tag(&image_url(uploads_base, case.image_path.as_deref()), &case.name, "case-image"),
            badge_class = badge_class,
            badge_text = badge_text,
            name = escape_html(&case.name),
            description = escape_html(&case.description),
            image_path = escape_html(case.image_path.as_deref().unwrap_or_default()),
            contact = escape_html(&case.contact),
            date = escape_html(&format_reported_at(case.created_at.as_deref())),
        );
    }
    html.push_str("</div>");
    html
}

/// Admin table rows with a delete action per case
pub fn render_case_table(cases: &[Case], uploads_base: &str) -> String {
    if cases.is_empty() {
        return r#"<tr><td colspan="6" class="empty">No cases found</td></tr>"#.to_string();
    }

    let mut html = String::new();
    for case in cases {
        let (badge_class, badge_text) = match case.status {
            CaseStatus::Missing => ("danger", "MISSING"),
            CaseStatus::Found => ("success", "FOUND"),
        };
        let _ = write!(
            html,
            concat!(
                "<tr>",
                "<td>{image}</td>",
                "<td><strong>{name}</strong></td>",
                r#"<td><span class="status-badge {badge_class}">{badge_text}</span></td>"#,
                "<td>{contact}</td>",
                "<td>{date}</td>",
                r#"<td><button class="btn btn-sm btn-danger delete-case" data-case-id="{id}">Delete</button></td>"#,
                "</tr>"
            ),
            image = image_tag(&image_url(uploads_base, case.image_path.as_deref()), &case.name, "table-image"),
            name = escape_html(&case.name),
            badge_class = badge_class,
            badge_text = badge_text,
            contact = escape_html(&case.contact),
            date = escape_html(&format_reported_at(case.created_at.as_deref())),
            id = case.case_id,
        );
    }
    html
}

pub fn render_statistics(stats: &Statistics) -> String {
    format!(
        concat!(
            r#"<div class="stats">"#,
            r#"<div class="stat"><span class="stat-value" id="total-cases">{}</span><span class="stat-label">Total Cases</span></div>"#,
            r#"<div class="stat"><span class="stat-value" id="missing-count">{}</span><span class="stat-label">Missing</span></div>"#,
            r#"<div class="stat"><span class="stat-value" id="found-count">{}</span><span class="stat-label">Found</span></div>"#,
            "</div>"
        ),
        stats.total_cases, stats.missing_persons, stats.found_persons
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::{rank, ConfidenceTier};
    use crate::model::MatchCandidate;

    const BASE: &str = "http://localhost:8000/uploads";

    fn candidate(name: &str, percentage: f64) -> MatchCandidate {
        MatchCandidate {
            case_id: Some(1),
            name: name.to_string(),
            status: CaseStatus::Missing,
            description: "Wearing a red jacket".to_string(),
            contact: "family@example.com".to_string(),
            image_path: Some("uploads\\20240301_face one.jpg".to_string()),
            similarity_score: None,
            similarity_percentage: percentage,
        }
    }

    fn case(id: i64, name: &str) -> Case {
        Case {
            case_id: id,
            name: name.to_string(),
            status: CaseStatus::Found,
            description: "Found at the park".to_string(),
            contact: "555-0199".to_string(),
            image_path: Some("C:\\data\\uploads\\park.png".to_string()),
            created_at: Some("2024-03-01T10:15:00".to_string()),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#39;y&#39;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_image_url_normalizes_and_encodes() {
        assert_eq!(
            image_url(BASE, Some("uploads\\20240301_face one.jpg")),
            "http://localhost:8000/uploads/20240301_face%20one.jpg"
        );
        assert_eq!(
            image_url(&format!("{}/", BASE), Some("a/b/c#1?.png")),
            "http://localhost:8000/uploads/c%231%3F.png"
        );
        assert_eq!(image_url(BASE, Some("it's(1).jpg")), "http://localhost:8000/uploads/it's(1).jpg");
        assert_eq!(image_url(BASE, Some("https://cdn.example/x.jpg")), "https://cdn.example/x.jpg");
    }

    #[test]
    fn test_image_url_placeholder() {
        assert_eq!(image_url(BASE, None), PLACEHOLDER_IMAGE);
        assert_eq!(image_url(BASE, Some("  ")), PLACEHOLDER_IMAGE);
        assert_eq!(image_url(BASE, Some("uploads/")), PLACEHOLDER_IMAGE);
    }

    #[test]
    fn test_results_escape_user_text() {
        let mut m = candidate("<script>alert(1)</script>", 91.0);
        m.description = "<script>steal()</script>".to_string();
        m.contact = "<b>call</b>".to_string();
        let html = render_search(&SearchState::from_matches(rank(vec![m])), BASE);

        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>call"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("&lt;script&gt;steal()&lt;/script&gt;"));
    }

    #[test]
    fn test_results_render_rank_tier_and_score() {
        let state = SearchState::from_matches(rank(vec![candidate("Ana", 87.5), candidate("Bo", 64.0)]));
        let html = render_search(&state, BASE);

        assert!(html.contains("<strong>2 potential matches</strong>"));
        assert!(html.contains("#1 Match"));
        assert!(html.contains("#2 Match"));
        assert!(html.contains(&format!("Match Confidence ({})", ConfidenceTier::VeryHigh)));
        assert!(html.contains("Match Confidence (Good)"));
        assert!(html.contains("87.5% Match"));
        assert!(html.contains("20240301_face%20one.jpg"));
        assert!(html.find("Ana").unwrap() < html.find("Bo").unwrap());
    }

    #[test]
    fn test_below_floor_never_rendered() {
        let state = SearchState::from_matches(rank(vec![candidate("Hidden", 59.0), candidate("Shown", 60.0)]));
        let html = render_search(&state, BASE);
        assert!(!html.contains("Hidden"));
        assert!(html.contains("Shown"));
        assert!(html.contains("<strong>1 potential match</strong>"));
    }

    #[test]
    fn test_no_results_indicator() {
        let state = SearchState::from_matches(rank(vec![candidate("Low", 12.0)]));
        assert_eq!(state, SearchState::NoResults);
        let html = render_search(&state, BASE);
        assert!(html.contains(r#"class="no-results""#));
        assert!(!html.contains("result-card"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let state = SearchState::from_matches(rank(vec![candidate("Ana", 87.5), candidate("Bo", 71.0)]));
        assert_eq!(render_search(&state, BASE), render_search(&state, BASE));

        let cases = vec![case(1, "Ana"), case(2, "Bo")];
        assert_eq!(render_case_cards(&cases, BASE), render_case_cards(&cases, BASE));
    }

    #[test]
    fn test_idle_and_searching() {
        assert_eq!(render_search(&SearchState::Idle, BASE), "");
        assert!(render_search(&SearchState::Searching, BASE).contains("Searching"));
    }

    #[test]
    fn test_case_cards() {
        let mut evil = case(3, "Eve");
        evil.image_path = Some("x'); alert('1".to_string());
        let html = render_case_cards(&[case(1, "Ana"), evil], BASE);

        assert!(html.contains("FOUND PERSON"));
        assert!(html.contains("http://localhost:8000/uploads/park.png"));
        assert!(html.contains("Mar 1, 2024 at 10:15 AM"));
        assert!(html.contains(r#"data-image-path="x&#39;); alert(&#39;1""#));
        assert_eq!(render_case_cards(&[], BASE), r#"<div class="no-cases">No cases found</div>"#);
    }

    #[test]
    fn test_case_table() {
        let html = render_case_table(&[case(42, "<i>Ana</i>")], BASE);
        assert!(html.contains(r#"data-case-id="42""#));
        assert!(html.contains("&lt;i&gt;Ana&lt;/i&gt;"));
        assert!(render_case_table(&[], BASE).contains("No cases found"));
    }

    #[test]
    fn test_reported_at_formats() {
        assert_eq!(format_reported_at(Some("2024-03-01T22:05:09.123456")), "Mar 1, 2024 at 10:05 PM");
        assert_eq!(format_reported_at(Some("2024-12-25T08:00:00+00:00")), "Dec 25, 2024 at 08:00 AM");
        assert_eq!(format_reported_at(Some("yesterday")), "yesterday");
        assert_eq!(format_reported_at(None), "Unknown date");
    }

    #[test]
    fn test_statistics() {
        let html = render_statistics(&Statistics {
            total_cases: 12,
            missing_persons: 7,
            found_persons: 5,
        });
        assert!(html.contains(r#"id="total-cases">12<"#));
        assert!(html.contains(r#"id="missing-count">7<"#));
        assert!(html.contains(r#"id="found-count">5<"#));
    }
}
