use select::document::Document;
use select::node::Node;
use select::predicate::{Attr, Class, Name, Predicate};
use url::Url;

/// Absolute urls of the links listed under `div.states`.
///
/// Only the first `a[href]` of each `li` is considered, items without one
/// and fragment only hrefs are skipped.
pub fn listing_links(document: &Document, page_url: &Url) -> Vec<Url> {
    document
        .find(Name("div").and(Class("states")).descendant(Name("li")))
        .filter_map(|li| first_href(&li))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| match page_url.join(href) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("Skipping link {href:?} on {page_url}: {e}");
                None
            }
        })
        .collect()
}

fn first_href<'a>(li: &Node<'a>) -> Option<&'a str> {
    li.find(Name("a").and(Attr("href", ())))
        .next()
        .and_then(|a| a.attr("href"))
}

/// Trimmed text of every `p.store-address`, in document order.
pub fn store_addresses(document: &Document) -> Vec<String> {
    document
        .find(Name("p").and(Class("store-address")))
        .map(|p| p.text().trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"
<html><body>
  <div class="states">
    <ul>
      <li><a href="/store-locator/ny">New York</a></li>
      <li><a href="nj">New Jersey</a></li>
      <li><span>No link</span></li>
      <li><a href="#top">Back to top</a></li>
      <li><a href="https://www.cvs.com/store-locator/ca">California</a></li>
    </ul>
  </div>
  <div class="cities">
    <ul><li><a href="/store-locator/elsewhere">Not a state</a></li></ul>
  </div>
</body></html>
"##;

    #[test]
    fn resolves_links_against_page() {
        let page = Url::parse("https://www.cvs.com/store-locator/cvs-pharmacy-locations").unwrap();
        let links = listing_links(&Document::from(LISTING), &page);
        let links: Vec<_> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec![
                "https://www.cvs.com/store-locator/ny",
                "https://www.cvs.com/store-locator/nj",
                "https://www.cvs.com/store-locator/ca",
            ]
        );
    }

    #[test]
    fn keeps_first_anchor_of_item() {
        let html = r#"<div class="states wide"><ul><li>
            <a href="/first">1</a><a href="/second">2</a>
        </li></ul></div>"#;
        let page = Url::parse("https://www.cvs.com/store-locator/ny").unwrap();
        let links = listing_links(&Document::from(html), &page);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "https://www.cvs.com/first");
    }

    #[test]
    fn padded_fragment_and_blank_hrefs_are_skipped() {
        let html = r#"<div class="states"><ul>
            <li><a href=" #top">Back to top</a></li>
            <li><a href="   ">Blank</a></li>
            <li><a href="  /store-locator/ny ">New York</a></li>
        </ul></div>"#;
        let page = Url::parse("https://www.cvs.com/store-locator/cvs-pharmacy-locations").unwrap();
        let links = listing_links(&Document::from(html), &page);
        let links: Vec<_> = links.iter().map(Url::as_str).collect();
        assert_eq!(links, vec!["https://www.cvs.com/store-locator/ny"]);
    }

    #[test]
    fn off_site_links_are_returned_as_is() {
        let html = r#"<div class="states"><ul><li><a href="https://example.com/x">x</a></li></ul></div>"#;
        let page = Url::parse("https://www.cvs.com/").unwrap();
        let links = listing_links(&Document::from(html), &page);
        assert_eq!(links[0].host_str(), Some("example.com"));
    }

    #[test]
    fn extracts_trimmed_addresses() {
        let html = r#"
<div class="results">
  <p class="store-address"> 123 Main St, Anytown, NY  </p>
  <p class="store-phone">555-0100</p>
  <p class="store-address">
      <span>45 Elm Ave,</span> Springfield, IL
  </p>
  <div class="store-address">not a paragraph</div>
</div>"#;
        assert_eq!(
            store_addresses(&Document::from(html)),
            vec!["123 Main St, Anytown, NY", "45 Elm Ave, Springfield, IL"]
        );
    }

    #[test]
    fn empty_address_is_kept() {
        let html = r#"<p class="store-address">   </p>"#;
        assert_eq!(store_addresses(&Document::from(html)), vec![String::new()]);
    }

    #[test]
    fn no_matches() {
        let document = Document::from("<html><body><p>hello</p></body></html>");
        let page = Url::parse("https://www.cvs.com/").unwrap();
        assert!(listing_links(&document, &page).is_empty());
        assert!(store_addresses(&document).is_empty());
    }
}
