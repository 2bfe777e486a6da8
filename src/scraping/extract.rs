//! Selector-driven product extraction.
//!
//! One structural selector finds candidate item nodes; each record field is
//! then read through its own selector. Failures stay local: a field that
//! matches nothing becomes an empty string, an item node that yields nothing
//! at all is skipped with a log line, and a page with zero candidates is an
//! empty result — never an error. End-of-results is the caller's call.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::core::config::SelectorSpec;
use crate::core::types::{ProductRecord, RenderedPage};

/// A selector in the config failed to parse. Caught at startup, before any
/// page is fetched.
#[derive(Debug, thiserror::Error)]
#[error("invalid CSS selector for `{field}`: {selector:?}")]
pub struct SelectorError {
    pub field: &'static str,
    pub selector: String,
}

/// Everything one pass over a rendered page yields.
#[derive(Debug, Clone)]
pub struct PageScan {
    pub records: Vec<ProductRecord>,
    /// An explicit "next page" control is present in the DOM.
    pub has_next: bool,
    /// Total advertised by the shop ("(1384 Products found)"), when present.
    pub total_results: Option<u64>,
}

/// A subcategory link discovered on a category landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub title: String,
    pub url: String,
}

#[derive(Debug)]
pub struct CatalogExtractor {
    item: Selector,
    url: Selector,
    title: Selector,
    image: Selector,
    price: Selector,
    rating: Selector,
    review_count: Selector,
    recent_activity: Selector,
    next: Selector,
    total: Selector,
    subcategory: Selector,
    price_token: Regex,
    total_count: Regex,
}

fn compile(field: &'static str, selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|_| SelectorError {
        field,
        selector: selector.to_string(),
    })
}

impl CatalogExtractor {
    pub fn new(spec: &SelectorSpec) -> Result<Self, SelectorError> {
        Ok(Self {
            item: compile("item", &spec.item)?,
            url: compile("url", &spec.url)?,
            title: compile("title", &spec.title)?,
            image: compile("image", &spec.image)?,
            price: compile("price", &spec.price)?,
            rating: compile("rating", &spec.rating)?,
            review_count: compile("review_count", &spec.review_count)?,
            recent_activity: compile("recent_activity", &spec.recent_activity)?,
            next: compile("next", &spec.next)?,
            total: compile("total", &spec.total)?,
            subcategory: compile("subcategory", &spec.subcategory)?,
            // first thousands-separated token in a price cell; tolerates
            // currency symbols and strike-through clutter around it
            price_token: Regex::new(r"\d{1,3}(?:,\d{3})*(?:\.\d+)?").expect("literal regex"),
            total_count: Regex::new(r"\((\d+)\s*Products?\s+found\)").expect("literal regex"),
        })
    }

    /// Records only; use [`Self::scan`] when the pagination signals matter.
    pub fn extract(&self, page: &RenderedPage) -> Vec<ProductRecord> {
        self.scan(page).records
    }

    /// One parse of the document: records, next affordance, advertised total.
    pub fn scan(&self, page: &RenderedPage) -> PageScan {
        let doc = Html::parse_document(&page.html);
        let base = Url::parse(&page.url).ok();

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for item in doc.select(&self.item) {
            let record = self.read_record(item, base.as_ref());
            if record.is_blank() {
                // structural selector matched, but nothing inside did —
                // most likely a placeholder tile or markup drift
                skipped += 1;
                continue;
            }
            records.push(record);
        }
        if skipped > 0 {
            warn!("{} item node(s) yielded no fields and were skipped", skipped);
        }

        PageScan {
            records,
            has_next: doc.select(&self.next).next().is_some(),
            total_results: self.read_total(&doc),
        }
    }

    /// Subcategory links on a category landing page, absolutized against the
    /// page URL. Empty when the page has none.
    pub fn subcategory_links(&self, page: &RenderedPage) -> Vec<CategoryLink> {
        let doc = Html::parse_document(&page.html);
        let base = Url::parse(&page.url).ok();

        let mut links = Vec::new();
        for node in doc.select(&self.subcategory) {
            let Some(href) = node.value().attr("href") else {
                continue;
            };
            let url = absolutize(href, base.as_ref());
            if url.is_empty() {
                continue;
            }
            links.push(CategoryLink {
                title: node_text(node),
                url,
            });
        }
        links
    }

    fn read_record(&self, item: ElementRef<'_>, base: Option<&Url>) -> ProductRecord {
        ProductRecord {
            url: attr_of(item, &self.url, "href")
                .map(|href| absolutize(&href, base))
                .unwrap_or_default(),
            title: text_of(item, &self.title).unwrap_or_default(),
            image_url: attr_of(item, &self.image, "src")
                .map(|src| absolutize(&src, base))
                .unwrap_or_default(),
            price: self.read_price(item),
            rating: self.read_rating(item),
            review_count: text_of(item, &self.review_count).unwrap_or_default(),
            recent_activity: text_of(item, &self.recent_activity).unwrap_or_default(),
        }
    }

    /// Price cell text, or the first price-looking token anywhere in the item
    /// when the dedicated selector comes up empty.
    fn read_price(&self, item: ElementRef<'_>) -> String {
        if let Some(price) = text_of(item, &self.price) {
            return price;
        }
        let text = node_text(item);
        match self.price_token.find(&text) {
            Some(token) if token.as_str() != "0" => {
                debug!("price selector missed; token fallback: {}", token.as_str());
                token.as_str().to_string()
            }
            _ => String::new(),
        }
    }

    /// Ratings usually live in a `title` attribute like "4.6 - 321 reviews";
    /// keep the leading score.
    fn read_rating(&self, item: ElementRef<'_>) -> String {
        let Some(node) = item.select(&self.rating).next() else {
            return String::new();
        };
        if let Some(title) = node.value().attr("title") {
            return title.split('-').next().unwrap_or("").trim().to_string();
        }
        node_text(node)
    }

    fn read_total(&self, doc: &Html) -> Option<u64> {
        let node = doc.select(&self.total).next()?;
        let text = node_text(node);
        let captures = self.total_count.captures(&text)?;
        captures.get(1)?.as_str().parse().ok()
    }
}

fn text_of(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let node = item.select(selector).next()?;
    let text = node_text(node);
    (!text.is_empty()).then_some(text)
}

fn attr_of(item: ElementRef<'_>, selector: &Selector, name: &str) -> Option<String> {
    let node = item.select(selector).next()?;
    let value = node.value().attr(name)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn node_text(node: ElementRef<'_>) -> String {
    node.text().collect::<String>().trim().to_string()
}

/// Resolve `href` against the page URL. Protocol-relative and bare-relative
/// links both show up in the wild; anything unresolvable collapses to empty.
fn absolutize(href: &str, base: Option<&Url>) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SelectorSpec;

    fn extractor() -> CatalogExtractor {
        CatalogExtractor::new(&SelectorSpec::default()).unwrap()
    }

    fn page(html: &str) -> RenderedPage {
        RenderedPage {
            url: "https://shop.example/c/vitamins?p=1".into(),
            html: html.into(),
        }
    }

    const FULL_ITEM: &str = r#"
        <div class="product-inner">
            <a class="product-link" href="/p/vitamin-d3-5000iu">link</a>
            <div class="product-title">Vitamin D3 5000 IU</div>
            <div class="product-image"><img src="https://cdn.example/d3.jpg"></div>
            <div class="product-price"><span class="price">$12.99</span></div>
            <span class="stars" title="4.6 - excellent"></span>
            <div class="rating-count"><span>1,204</span></div>
            <div class="recent-activity-message-wrapper">900+ sold last month</div>
        </div>"#;

    #[test]
    fn extracts_a_complete_record() {
        let html = format!(r#"<html><body>{FULL_ITEM}</body></html>"#);
        let records = extractor().extract(&page(&html));
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.url, "https://shop.example/p/vitamin-d3-5000iu");
        assert_eq!(r.title, "Vitamin D3 5000 IU");
        assert_eq!(r.image_url, "https://cdn.example/d3.jpg");
        assert_eq!(r.price, "$12.99");
        assert_eq!(r.rating, "4.6");
        assert_eq!(r.review_count, "1,204");
        assert_eq!(r.recent_activity, "900+ sold last month");
    }

    #[test]
    fn zero_candidates_is_empty_not_an_error() {
        let scan = extractor().scan(&page("<html><body><p>maintenance</p></body></html>"));
        assert!(scan.records.is_empty());
        assert!(!scan.has_next);
        assert_eq!(scan.total_results, None);
    }

    #[test]
    fn missing_fields_default_without_dropping_the_record() {
        let html = r#"<html><body>
            <div class="product-inner">
                <div class="product-title">Zinc Picolinate</div>
            </div>
            <div class="product-inner">
                <a class="product-link" href="/p/magnesium"></a>
                <div class="product-title">Magnesium Glycinate</div>
                <div class="product-price"><span class="price">$8.49</span></div>
            </div>
        </body></html>"#;
        let records = extractor().extract(&page(html));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Zinc Picolinate");
        assert_eq!(records[0].price, "");
        assert_eq!(records[0].rating, "");
        assert_eq!(records[1].url, "https://shop.example/p/magnesium");
    }

    #[test]
    fn blank_item_nodes_are_skipped_silently() {
        let html = format!(
            r#"<html><body><div class="product-inner"><br></div>{FULL_ITEM}</body></html>"#
        );
        let records = extractor().extract(&page(&html));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Vitamin D3 5000 IU");
    }

    #[test]
    fn price_token_fallback_scans_item_text() {
        let html = r#"<html><body>
            <div class="product-inner">
                <div class="product-title">Gaming Laptop</div>
                <p class="pr-text">Special Price 145,500 Tk (Regular 160,000)</p>
            </div>
        </body></html>"#;
        let records = extractor().extract(&page(html));
        assert_eq!(records[0].price, "145,500");
    }

    #[test]
    fn next_affordance_and_total_probe() {
        let html = r#"<html><body>
            <span class="found-text">(1384 Products found)</span>
            <div class="product-inner"><div class="product-title">A</div></div>
            <a class="pagination-next" href="?p=2">Next</a>
        </body></html>"#;
        let scan = extractor().scan(&page(html));
        assert!(scan.has_next);
        assert_eq!(scan.total_results, Some(1384));
    }

    #[test]
    fn subcategory_links_absolutize_relative_hrefs() {
        let html = r#"<html><body>
            <h2><a href="/supplements/omega-3">Omega-3</a></h2>
            <h2><a href="https://other.example/minerals">Minerals</a></h2>
            <h2><a>broken</a></h2>
        </body></html>"#;
        let links = extractor().subcategory_links(&page(html));
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://shop.example/supplements/omega-3");
        assert_eq!(links[0].title, "Omega-3");
        assert_eq!(links[1].url, "https://other.example/minerals");
    }

    #[test]
    fn invalid_selector_is_a_startup_error() {
        let spec = SelectorSpec {
            item: ":::".into(),
            ..Default::default()
        };
        let err = CatalogExtractor::new(&spec).unwrap_err();
        assert_eq!(err.field, "item");
    }
}
