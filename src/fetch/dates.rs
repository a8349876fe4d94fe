// src/fetch/dates.rs
use anyhow::{anyhow, Context, Result};
use scraper::{Html, Selector};
use tracing::{info, instrument};
use url::Url;

use crate::browser::PageSource;
use crate::config::SiteConfig;
use crate::error::ScrapeError;
use crate::types::{DateEntry, LinkEntry};

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid CSS selector `{}`: {:?}", css, e))
}

/// Every `<option>` of `<select id=select_id>`, in page order.
pub fn parse_trade_dates(html: &str, select_id: &str) -> Result<Vec<DateEntry>> {
    let doc = Html::parse_document(html);
    let select_sel = selector(&format!("#{}", select_id))?;
    let option_sel = selector("option")?;

    let select = doc
        .select(&select_sel)
        .next()
        .ok_or_else(|| ScrapeError::ElementNotFound(format!("#{}", select_id)))?;

    Ok(select
        .select(&option_sel)
        .map(|opt| {
            let text = opt.text().collect::<String>();
            let value = opt
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| text.trim().to_string());
            DateEntry::new(value, text.trim())
        })
        .collect())
}

/// Report links from the navigation list, plus one for the page itself,
/// sorted by label descending.
pub fn parse_links(html: &str, site: &SiteConfig) -> Result<Vec<LinkEntry>> {
    let doc = Html::parse_document(html);
    let list_sel = selector(&site.link_list_selector)?;
    let link_sel = selector(&site.link_selector)?;
    let base = Url::parse(&site.base_url)
        .with_context(|| format!("parsing base URL {}", site.base_url))?;

    let list = doc
        .select(&list_sel)
        .next()
        .ok_or_else(|| ScrapeError::ElementNotFound(site.link_list_selector.clone()))?;

    let mut links = list
        .select(&link_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let url = base.join(href).ok()?;
            let label = a.text().collect::<String>().replace('\n', "");
            Some(LinkEntry {
                label: label.trim().to_string(),
                url,
            })
        })
        .collect::<Vec<_>>();

    links.push(LinkEntry {
        label: site.current_page_label.clone(),
        url: Url::parse(&site.source_url)
            .with_context(|| format!("parsing source URL {}", site.source_url))?,
    });
    links.sort_by(|a, b| b.label.cmp(&a.label));
    Ok(links)
}

/// Load the source page once and enumerate its trade dates and report links.
#[instrument(level = "info", skip_all, fields(url = %site.source_url))]
pub async fn get_cme_dates<S: PageSource>(
    source: &mut S,
    site: &SiteConfig,
) -> Result<(Vec<DateEntry>, Vec<LinkEntry>)> {
    let url = Url::parse(&site.source_url)
        .with_context(|| format!("parsing source URL {}", site.source_url))?;
    let html = source.fetch_html(&url).await?;

    let dates = parse_trade_dates(&html, &site.date_select_id)?;
    let links = parse_links(&html, site)?;
    info!(dates = dates.len(), links = links.len(), "enumerated trade dates");
    Ok((dates, links))
}
