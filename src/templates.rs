use axum::response::Html;
use handlebars::Handlebars;
use serde::Serialize;

use crate::error::Result;

const PAGES: [(&str, &str); 14] = [
    ("landing", include_str!("./static/landing.hbs")),
    ("public_bus", include_str!("./static/public_bus.hbs")),
    ("login", include_str!("./static/login.hbs")),
    ("register", include_str!("./static/register.hbs")),
    ("dashboard", include_str!("./static/dashboard.hbs")),
    ("inventory", include_str!("./static/inventory.hbs")),
    ("bus_form", include_str!("./static/bus_form.hbs")),
    ("fiche", include_str!("./static/fiche.hbs")),
    ("qr", include_str!("./static/qr.hbs")),
    ("qr_print", include_str!("./static/qr_print.hbs")),
    ("parts", include_str!("./static/parts.hbs")),
    ("part_form", include_str!("./static/part_form.hbs")),
    ("profile", include_str!("./static/profile.hbs")),
    ("not_found", include_str!("./static/not_found.hbs")),
];

const PARTIALS: [(&str, &str); 2] = [
    ("head", include_str!("./static/partials/head.hbs")),
    ("nav", include_str!("./static/partials/nav.hbs")),
];

/// Compiled page templates.
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    /// Compile every page and partial. Fails on a malformed template.
    pub fn new() -> std::result::Result<Self, handlebars::TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        for (name, source) in PARTIALS {
            registry.register_partial(name, source)?;
        }
        for (name, source) in PAGES {
            registry.register_template_string(name, source)?;
        }

        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, page: &str, data: &T) -> Result<Html<String>> {
        Ok(Html(self.registry.render(page, data)?))
    }
}

/// One page of a filtered list, with the links a pager needs.
#[derive(Debug, Serialize)]
pub struct Paged<T: Serialize> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

/// Slice `items` to the 1-based `page`, clamped to the valid range.
pub fn paginate<T: Serialize>(items: Vec<T>, page: usize, per_page: usize) -> Paged<T> {
    let per_page = per_page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);

    let items = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    Paged {
        items,
        page,
        total_pages,
        total_items,
        prev: (page > 1).then(|| page - 1),
        next: (page < total_pages).then(|| page + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_compiles() {
        assert!(Pages::new().is_ok());
    }

    #[test]
    fn pagination_clamps_and_links() {
        let paged = paginate((1..=14).collect::<Vec<u32>>(), 3, 6);
        assert_eq!(paged.items, vec![13, 14]);
        assert_eq!(paged.total_pages, 3);
        assert_eq!(paged.prev, Some(2));
        assert_eq!(paged.next, None);

        let paged = paginate((1..=14).collect::<Vec<u32>>(), 0, 6);
        assert_eq!(paged.page, 1);
        assert_eq!(paged.prev, None);

        let empty = paginate(Vec::<u32>::new(), 5, 6);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.items.is_empty());
    }
}
