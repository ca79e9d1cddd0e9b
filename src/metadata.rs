use std::collections::HashMap;
use std::time::Duration;
use scraper::{ElementRef, Html, Selector};
use scraper::node::Node;

/// Fields read off a Pegasas product page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    BookName,
    Author,
    Publisher,
    Year,
    TotalPages,
    Identifier,
    Language,
    SeriesName,
}

pub type FieldMap = HashMap<Field, String>;

/// Lower-cased label fragments of the `product-specs` rows, checked in order.
const ROW_LABELS: &[(&str, Field)] = &[
    ("leidykla", Field::Publisher),
    ("leidimo metai", Field::Year),
    ("puslapių skaičius", Field::TotalPages),
    ("isbn", Field::Identifier),
    ("ean", Field::Identifier),
    ("leidinio kalba", Field::Language),
    ("serija", Field::SeriesName),
];

const SITE_DOMAIN: &str = "pegasas.lt";

/// Only absolute Pegasas URLs are accepted.
pub fn is_product_url(url: &str) -> bool {
    url.starts_with("http") && url.contains(SITE_DOMAIN)
}

fn label_field(label: &str) -> Option<Field> {
    let label = label.to_lowercase();
    ROW_LABELS
        .iter()
        .find(|(fragment, _)| label.contains(fragment))
        .map(|(_, field)| *field)
}

/// Text of an element with every text node trimmed and glued together.
fn stripped_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .collect::<String>()
}

/// Value of a `product-specs` row: the text right after the label span, or else the row
/// text with the label cut out.
fn row_value(li: ElementRef, span: ElementRef, label: &str) -> String {

    let following = span
        .next_sibling()
        .and_then(|node| match node.value() {
            Node::Text(text) => Some(text.trim().to_string()),
            _ => None,
        })
        .filter(|text| !text.is_empty());

    match following {
        Some(value) => value,
        None => stripped_text(li).replace(label, "").trim().to_string(),
    }
}

/// Pulls the known fields out of a product page. Never fails: anything that
/// cannot be found is simply absent from the map.
pub fn extract(html: &str) -> FieldMap {

    let document = Html::parse_document(html);
    let title_selector = Selector::parse("h1.product-title").unwrap();
    let author_selector = Selector::parse("span.product-author").unwrap();
    let specs_selector = Selector::parse("ul.product-specs li").unwrap();
    let span_selector = Selector::parse("span").unwrap();

    let mut data = FieldMap::new();

    if let Some(h1) = document.select(&title_selector).next() {
        data.insert(Field::BookName, stripped_text(h1));
    }

    if let Some(author) = document.select(&author_selector).next() {
        data.insert(Field::Author, stripped_text(author));
    }

    for li in document.select(&specs_selector) {
        let Some(span) = li.select(&span_selector).next() else {
            continue;
        };

        let label = stripped_text(span);
        let Some(field) = label_field(&label) else {
            continue;
        };

        data.insert(field, row_value(li, span, &label));
    }

    data
}

/// Downloads and extracts a product page. Any failure is logged and yields an empty map.
pub async fn fetch_product_page(url: &str) -> FieldMap {

    match fetch_html(url).await {
        Ok(Some(html)) => extract(&html),
        Ok(None) => FieldMap::new(),
        Err(err) => {
            tracing::error!(url, error = %err, "error scraping product page");
            FieldMap::new()
        }
    }
}

async fn fetch_html(url: &str) -> Result<Option<String>, reqwest::Error> {

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client.get(url).send().await?;
    if response.status() != reqwest::StatusCode::OK {
        tracing::warn!(url, status = %response.status(), "product page not available");
        return Ok(None);
    }

    Ok(Some(response.text().await?))
}

/// Renders the fixed-order listing printed by the metadata tool.
pub fn render_form(data: &FieldMap) -> String {

    let get = |field: Field| data.get(&field).map(String::as_str).unwrap_or("");
    let language = data
        .get(&Field::Language)
        .map(String::as_str)
        .unwrap_or("-- not selected --");

    let mut form = String::new();
    form.push_str(&format!("Book name: {}\n\n", get(Field::BookName)));
    form.push_str("Category: -- not selected -- (Dropdown)\n");
    form.push_str(&format!("Language: {} (Dropdown)\n", language));
    form.push_str("Type of content: -- not selected -- (Dropdown)\n");
    form.push_str(&format!("Publisher: {}\n", get(Field::Publisher)));
    form.push_str(&format!("Series name: {}\n", get(Field::SeriesName)));
    form.push_str("Volume: \n");
    form.push_str("Edition: \n");
    form.push_str(&format!("Year: {}\n", get(Field::Year)));
    form.push_str(&format!("Total pages: {}\n", get(Field::TotalPages)));
    form.push_str("Book description: \n");
    form.push_str(&format!("Author(s): {}\n", get(Field::Author)));
    form.push_str(&format!("Identifier (e.g., ISBN): {}\n", get(Field::Identifier)));
    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    const PRODUCT_PAGE: &str = r#"<!doctype html>
<html>
  <body>
    <h1 class="product-title">
      Mažasis princas
    </h1>
    <span class="product-author"> Antoine de Saint-Exupéry </span>
    <ul class="product-specs">
      <li><span>Leidykla:</span> Alma littera </li>
      <li><span>Leidimo metai:</span> 2021</li>
      <li><span>Puslapių skaičius:</span> 96</li>
      <li><span>ISBN:</span> 9786090152773</li>
      <li><span>Leidinio kalba:</span> lietuvių</li>
      <li><span>Serija:</span><b>Klasika</b></li>
      <li><span>Formatas:</span> 13x20</li>
      <li>No label at all</li>
    </ul>
  </body>
</html>
"#;

    #[test]
    fn extracts_recognised_fields() {
        let data = extract(PRODUCT_PAGE);

        assert_eq!(data[&Field::BookName], "Mažasis princas");
        assert_eq!(data[&Field::Author], "Antoine de Saint-Exupéry");
        assert_eq!(data[&Field::Publisher], "Alma littera");
        assert_eq!(data[&Field::Year], "2021");
        assert_eq!(data[&Field::TotalPages], "96");
        assert_eq!(data[&Field::Identifier], "9786090152773");
        assert_eq!(data[&Field::Language], "lietuvių");
        assert_eq!(data[&Field::SeriesName], "Klasika");
        assert_eq!(data.len(), 8);
    }

    #[test]
    fn ean_label_maps_to_identifier() {
        let html = r#"<ul class="product-specs"><li><span>EAN</span> 4770000000000</li></ul>"#;
        let data = extract(html);

        assert_eq!(data.len(), 1);
        assert_eq!(data[&Field::Identifier], "4770000000000");
    }

    #[test]
    fn absent_fields_are_omitted() {
        let html = r#"<h1 class="product-title">Only a title</h1>"#;
        let data = extract(html);

        assert_eq!(data.len(), 1);
        assert!(!data.contains_key(&Field::Author));
    }

    #[test]
    fn empty_or_malformed_input_gives_empty_map() {
        assert!(extract("").is_empty());
        assert!(extract("<<<not html at all").is_empty());
        assert!(extract("<ul class='product-specs'><li><span>").is_empty());
    }

    #[test]
    fn form_layout_is_fixed() {
        let form = render_form(&extract(PRODUCT_PAGE));
        let expected = "Book name: Mažasis princas\n\
\n\
Category: -- not selected -- (Dropdown)\n\
Language: lietuvių (Dropdown)\n\
Type of content: -- not selected -- (Dropdown)\n\
Publisher: Alma littera\n\
Series name: Klasika\n\
Volume: \n\
Edition: \n\
Year: 2021\n\
Total pages: 96\n\
Book description: \n\
Author(s): Antoine de Saint-Exupéry\n\
Identifier (e.g., ISBN): 9786090152773\n";
        assert_eq!(form, expected);
    }

    #[test]
    fn missing_language_renders_placeholder() {
        let form = render_form(&FieldMap::new());
        assert!(form.contains("Language: -- not selected -- (Dropdown)\n"));
        assert!(form.starts_with("Book name: \n\n"));
    }

    #[test]
    fn url_validation() {
        assert!(is_product_url("https://www.pegasas.lt/knyga/123"));
        assert!(!is_product_url("www.pegasas.lt/knyga/123"));
        assert!(!is_product_url("https://example.com/knyga"));
    }

    fn spawn_page_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let response = match request.url() {
                    "/knyga" => tiny_http::Response::from_string(PRODUCT_PAGE),
                    _ => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        (base_url, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn fetches_and_extracts_over_http() {
        let (base_url, shutdown_tx, handle) = spawn_page_server();

        let data = fetch_product_page(&format!("{base_url}/knyga")).await;
        assert_eq!(data[&Field::Year], "2021");

        let missing = fetch_product_page(&format!("{base_url}/nera")).await;
        assert!(missing.is_empty());

        let _ = shutdown_tx.send(());
        handle.join().expect("join page server");
    }

    #[tokio::test]
    async fn unreachable_host_gives_empty_map() {
        let data = fetch_product_page("http://127.0.0.1:9/knyga").await;
        assert!(data.is_empty());
    }
}
