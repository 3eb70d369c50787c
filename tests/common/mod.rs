//! In-memory page used by the extraction tests
//!
//! `FakePage` keeps a tiny DOM in an arena, understands the CSS subset the harvester
//! uses (tag, `.class`, `#id`, `[attr]`, `[attr='v']`, `[attr*='v']`, `:not(...)` and the
//! descendant combinator) and runs registered closures when elements are clicked.

#![allow(dead_code)]

use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;
use table_harvest::extract::expand::LIST_TOGGLE_FUNCTIONS_JS;
use table_harvest::{ClickMethod, ElementRef, HarvestConfig, HarvestError, PageDriver, Result};

pub type Handler = Rc<dyn Fn(&FakePage)>;

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<usize>,
    parent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrOp)>,
    not: Vec<Compound>,
}

fn split_compounds(css: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut quote: Option<char> = None;

    for c in css.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches(|c| c == '\'' || c == '"').to_string()
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(source: &str) -> Compound {
    let chars: Vec<char> = source.chars().collect();
    let mut compound = Compound::default();
    let mut i = 0;

    while i < chars.len() && (is_name_char(chars[i]) || chars[i] == '*') {
        i += 1;
    }
    let tag: String = chars[..i].iter().collect();
    if !tag.is_empty() && tag != "*" {
        compound.tag = Some(tag.to_lowercase());
    }

    while i < chars.len() {
        match chars[i] {
            kind @ ('.' | '#') => {
                i += 1;
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if kind == '.' {
                    compound.classes.push(name);
                } else {
                    compound.id = Some(name);
                }
            }
            '[' => {
                let end = (i..chars.len()).find(|&j| chars[j] == ']').expect("unterminated attribute selector");
                let inner: String = chars[i + 1..end].iter().collect();
                i = end + 1;
                let (name, op) = if let Some((name, value)) = inner.split_once("*=") {
                    (name, AttrOp::Contains(unquote(value)))
                } else if let Some((name, value)) = inner.split_once('=') {
                    (name, AttrOp::Equals(unquote(value)))
                } else {
                    (inner.as_str(), AttrOp::Exists)
                };
                compound.attrs.push((name.trim().to_string(), op));
            }
            ':' => {
                let rest: String = chars[i..].iter().collect();
                assert!(rest.starts_with(":not("), "unsupported pseudo-class in {}", source);
                let close = (i..chars.len()).find(|&j| chars[j] == ')').expect("unterminated :not(");
                let inner: String = chars[i + 5..close].iter().collect();
                compound.not.push(parse_compound(&inner));
                i = close + 1;
            }
            other => panic!("unsupported selector syntax {:?} in {}", other, source),
        }
    }
    compound
}

/// Arena-backed DOM with click handlers
pub struct FakePage {
    nodes: RefCell<Vec<Node>>,
    handlers: RefCell<HashMap<usize, Handler>>,
    rejected: RefCell<HashSet<(usize, ClickMethod)>>,
    key_handlers: RefCell<HashMap<String, Handler>>,
    functions: RefCell<Vec<(String, Handler)>>,
    fail_navigation: RefCell<bool>,
    stale: RefCell<HashSet<usize>>,

    pub clicks: RefCell<Vec<(ElementRef, ClickMethod)>>,
    pub keys: RefCell<Vec<String>>,
    pub navigations: RefCell<Vec<String>>,
    pub screenshots: RefCell<usize>,
    pub closed: RefCell<usize>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        let body = Node {
            tag: "body".to_string(),
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
        };
        Self {
            nodes: RefCell::new(vec![body]),
            handlers: RefCell::new(HashMap::new()),
            rejected: RefCell::new(HashSet::new()),
            key_handlers: RefCell::new(HashMap::new()),
            functions: RefCell::new(Vec::new()),
            fail_navigation: RefCell::new(false),
            stale: RefCell::new(HashSet::new()),
            clicks: RefCell::new(Vec::new()),
            keys: RefCell::new(Vec::new()),
            navigations: RefCell::new(Vec::new()),
            screenshots: RefCell::new(0),
            closed: RefCell::new(0),
        }
    }

    pub fn body(&self) -> ElementRef {
        ElementRef(0)
    }

    // ---- building -------------------------------------------------------------------

    /// New element outside the document
    pub fn create(&self, tag: &str, attrs: &[(&str, &str)], text: &str) -> ElementRef {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(Node {
            tag: tag.to_lowercase(),
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            text: text.to_string(),
            children: Vec::new(),
            parent: None,
        });
        ElementRef((nodes.len() - 1) as u64)
    }

    pub fn append_child(&self, parent: ElementRef, child: ElementRef) {
        self.detach(child);
        let mut nodes = self.nodes.borrow_mut();
        nodes[child.0 as usize].parent = Some(parent.0 as usize);
        nodes[parent.0 as usize].children.push(child.0 as usize);
    }

    /// Create and append in one go
    pub fn append(&self, parent: ElementRef, tag: &str, attrs: &[(&str, &str)], text: &str) -> ElementRef {
        let element = self.create(tag, attrs, text);
        self.append_child(parent, element);
        element
    }

    pub fn insert_after(&self, reference: ElementRef, node: ElementRef) {
        self.detach(node);
        let mut nodes = self.nodes.borrow_mut();
        let parent = nodes[reference.0 as usize].parent.expect("reference node must be in a parent");
        let siblings = &mut nodes[parent].children;
        let position = siblings.iter().position(|&c| c == reference.0 as usize).expect("reference among siblings");
        siblings.insert(position + 1, node.0 as usize);
        nodes[node.0 as usize].parent = Some(parent);
    }

    /// Take a node (and its subtree) out of the document
    pub fn detach(&self, node: ElementRef) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(parent) = nodes[node.0 as usize].parent.take() {
            nodes[parent].children.retain(|&c| c != node.0 as usize);
        }
    }

    pub fn clear_children(&self, parent: ElementRef) {
        let children = self.nodes.borrow()[parent.0 as usize].children.clone();
        for child in children {
            self.detach(ElementRef(child as u64));
        }
    }

    pub fn set_attr(&self, element: ElementRef, name: &str, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        let attrs = &mut nodes[element.0 as usize].attrs;
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attr(&self, element: ElementRef, name: &str) {
        self.nodes.borrow_mut()[element.0 as usize].attrs.retain(|(k, _)| k != name);
    }

    pub fn hide(&self, element: ElementRef) {
        self.set_attr(element, "hidden", "");
    }

    pub fn show(&self, element: ElementRef) {
        self.remove_attr(element, "hidden");
    }

    pub fn on_click(&self, element: ElementRef, handler: impl Fn(&FakePage) + 'static) {
        self.handlers.borrow_mut().insert(element.0 as usize, Rc::new(handler));
    }

    pub fn reject(&self, element: ElementRef, method: ClickMethod) {
        self.rejected.borrow_mut().insert((element.0 as usize, method));
    }

    pub fn accept(&self, element: ElementRef, method: ClickMethod) {
        self.rejected.borrow_mut().remove(&(element.0 as usize, method));
    }

    pub fn on_key(&self, key: &str, handler: impl Fn(&FakePage) + 'static) {
        self.key_handlers.borrow_mut().insert(key.to_string(), Rc::new(handler));
    }

    /// Global function visible to page scripts
    pub fn define_function(&self, name: &str, handler: impl Fn(&FakePage) + 'static) {
        self.functions.borrow_mut().push((name.to_string(), Rc::new(handler)));
    }

    /// Keep `element` in query results but fail every read on it
    pub fn go_stale(&self, element: ElementRef) {
        self.stale.borrow_mut().insert(element.0 as usize);
    }

    pub fn fail_navigation(&self) {
        *self.fail_navigation.borrow_mut() = true;
    }

    // ---- inspection -----------------------------------------------------------------

    pub fn select(&self, css: &str) -> Vec<ElementRef> {
        self.query_all(None, css).expect("query on the document")
    }

    pub fn clicks_on(&self, element: ElementRef) -> Vec<ClickMethod> {
        self.clicks.borrow().iter().filter(|(e, _)| *e == element).map(|(_, m)| *m).collect()
    }

    fn attached(&self, index: usize) -> bool {
        let nodes = self.nodes.borrow();
        let mut current = index;
        loop {
            if current == 0 {
                return true;
            }
            match nodes.get(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn live(&self, element: ElementRef) -> Result<usize> {
        let index = element.0 as usize;
        if index < self.nodes.borrow().len() && self.attached(index) && !self.stale.borrow().contains(&index) {
            Ok(index)
        } else {
            Err(HarvestError::ElementNotFound(format!("stale element reference {}", element.0)))
        }
    }

    fn attr(&self, index: usize, name: &str) -> Option<String> {
        self.nodes.borrow()[index].attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    fn matches_compound(&self, index: usize, compound: &Compound) -> bool {
        let node = self.nodes.borrow()[index].clone();
        if compound.tag.as_ref().is_some_and(|tag| *tag != node.tag) {
            return false;
        }
        if let Some(id) = &compound.id {
            if self.attr(index, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        let class = self.attr(index, "class").unwrap_or_default();
        if !compound.classes.iter().all(|wanted| class.split_whitespace().any(|c| c == wanted)) {
            return false;
        }
        for (name, op) in &compound.attrs {
            let ok = match (self.attr(index, name), op) {
                (None, _) => false,
                (Some(_), AttrOp::Exists) => true,
                (Some(value), AttrOp::Equals(expected)) => value == *expected,
                (Some(value), AttrOp::Contains(needle)) => value.contains(needle.as_str()),
            };
            if !ok {
                return false;
            }
        }
        !compound.not.iter().any(|negated| self.matches_compound(index, negated))
    }

    fn matches_selector(&self, index: usize, compounds: &[Compound]) -> bool {
        let Some((last, ancestors)) = compounds.split_last() else { return false };
        if !self.matches_compound(index, last) {
            return false;
        }

        let mut remaining = ancestors;
        let mut current = self.nodes.borrow()[index].parent;
        while let Some((wanted, rest)) = remaining.split_last() {
            let Some(ancestor) = current else { return false };
            if self.matches_compound(ancestor, wanted) {
                remaining = rest;
            }
            current = self.nodes.borrow()[ancestor].parent;
        }
        true
    }

    fn descendants(&self, index: usize, out: &mut Vec<usize>) {
        let children = self.nodes.borrow()[index].children.clone();
        for child in children {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn text_of(&self, index: usize) -> String {
        let node = self.nodes.borrow()[index].clone();
        let mut text = node.text;
        for child in node.children {
            text.push_str(&self.text_of(child));
        }
        text
    }

    fn html_of(&self, index: usize) -> String {
        let node = self.nodes.borrow()[index].clone();
        let mut html = node.text;
        for child in node.children {
            let tag = self.nodes.borrow()[child].tag.clone();
            let attrs: String = self.nodes.borrow()[child]
                .attrs
                .iter()
                .map(|(k, v)| format!(" {}=\"{}\"", k, v))
                .collect();
            html.push_str(&format!("<{}{}>{}</{}>", tag, attrs, self.html_of(child), tag));
        }
        html
    }

    fn run_handler(&self, handler: Option<Handler>) {
        if let Some(handler) = handler {
            handler(self);
        }
    }
}

impl PageDriver for FakePage {
    fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.borrow_mut().push(url.to_string());
        if *self.fail_navigation.borrow() {
            return Err(HarvestError::NavigationFailed(format!("Failed to navigate to {}", url)));
        }
        Ok(())
    }

    fn wait_for_network_idle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn query_all(&self, scope: Option<ElementRef>, css: &str) -> Result<Vec<ElementRef>> {
        let root = match scope {
            Some(element) => self.live(element)?,
            None => 0,
        };
        let compounds: Vec<Compound> = split_compounds(css).iter().map(|part| parse_compound(part)).collect();

        let mut candidates = Vec::new();
        self.descendants(root, &mut candidates);
        Ok(candidates
            .into_iter()
            .filter(|&index| self.matches_selector(index, &compounds))
            .map(|index| ElementRef(index as u64))
            .collect())
    }

    fn text_content(&self, element: ElementRef) -> Result<String> {
        let index = self.live(element)?;
        Ok(self.text_of(index))
    }

    fn inner_html(&self, element: ElementRef) -> Result<String> {
        let index = self.live(element)?;
        Ok(self.html_of(index))
    }

    fn attribute(&self, element: ElementRef, name: &str) -> Result<Option<String>> {
        let index = self.live(element)?;
        Ok(self.attr(index, name))
    }

    fn tag_name(&self, element: ElementRef) -> Result<String> {
        let index = self.live(element)?;
        Ok(self.nodes.borrow()[index].tag.clone())
    }

    fn computed_style(&self, element: ElementRef, property: &str) -> Result<String> {
        let index = self.live(element)?;
        let style = self.attr(index, "style").unwrap_or_default();
        let value = style.split(';').find_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            (name.trim() == property).then(|| value.trim().to_string())
        });
        Ok(value.unwrap_or_else(|| if property == "cursor" { "auto".to_string() } else { String::new() }))
    }

    fn is_visible(&self, element: ElementRef) -> Result<bool> {
        let mut current = Some(self.live(element)?);
        while let Some(index) = current {
            if self.attr(index, "hidden").is_some() {
                return Ok(false);
            }
            current = self.nodes.borrow()[index].parent;
        }
        Ok(true)
    }

    fn click(&self, element: ElementRef, method: ClickMethod) -> Result<()> {
        let index = self.live(element)?;
        self.clicks.borrow_mut().push((element, method));
        if self.rejected.borrow().contains(&(index, method)) {
            return Err(HarvestError::TabOperationFailed(format!("{} on {} intercepted", method, element)));
        }

        // Nearest handler up the tree; it stops propagation
        let mut current = Some(index);
        while let Some(at) = current {
            let handler = self.handlers.borrow().get(&at).cloned();
            if handler.is_some() {
                self.run_handler(handler);
                break;
            }
            current = self.nodes.borrow()[at].parent;
        }
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<()> {
        self.keys.borrow_mut().push(key.to_string());
        let handler = self.key_handlers.borrow().get(key).cloned();
        self.run_handler(handler);
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<Value> {
        if script == LIST_TOGGLE_FUNCTIONS_JS {
            let names: Vec<String> = self
                .functions
                .borrow()
                .iter()
                .map(|(name, _)| name.clone())
                .filter(|name| {
                    let lower = name.to_lowercase();
                    lower.contains("toggle") || lower.contains("expand") || lower.contains("fold")
                })
                .collect();
            return Ok(Value::String(serde_json::to_string(&names)?));
        }

        if let Some(quoted) = script.strip_prefix("window[").and_then(|rest| rest.strip_suffix("]()")) {
            let name: String = serde_json::from_str(quoted)?;
            let handler = self.functions.borrow().iter().find(|(n, _)| *n == name).map(|(_, h)| h.clone());
            return match handler {
                Some(handler) => {
                    handler(self);
                    Ok(Value::Null)
                }
                None => Err(HarvestError::EvaluationFailed(format!("{} is not a function", name))),
            };
        }

        Ok(Value::Null)
    }

    fn capture_screenshot(&self) -> Result<Vec<u8>> {
        *self.screenshots.borrow_mut() += 1;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    fn close(&self) -> Result<()> {
        *self.closed.borrow_mut() += 1;
        Ok(())
    }
}

// ---- table fixture --------------------------------------------------------------------

/// A page shaped like the procedure-code listing: a data table, a hidden detail popup
/// and a pagination bar
pub struct TablePage {
    pub page: Rc<FakePage>,
    pub tbody: ElementRef,
    pub popup: ElementRef,
    pub popup_table: ElementRef,
    pub pagination: ElementRef,
}

impl TablePage {
    pub fn new() -> Self {
        let page = Rc::new(FakePage::new());
        let container = page.append(page.body(), "div", &[("id", "container")], "");
        let table = page.append(container, "table", &[("class", "act_table")], "");
        page.append(table, "thead", &[], "");
        let tbody = page.append(table, "tbody", &[], "");
        let pagination = page.append(page.body(), "div", &[("class", "pagination")], "");

        let popup = page.append(page.body(), "div", &[("class", "popup"), ("hidden", "")], "");
        let popup_table = page.append(popup, "table", &[], "");
        let close = page.append(popup, "button", &[], "닫기");
        page.on_click(close, move |p| p.hide(popup));
        page.on_key("Escape", move |p| p.hide(popup));

        Self { page, tbody, popup, popup_table, pagination }
    }

    /// Detached row with one cell per text
    pub fn row(&self, class: &str, cells: &[&str]) -> ElementRef {
        let attrs: Vec<(&str, &str)> = if class.is_empty() { Vec::new() } else { vec![("class", class)] };
        let row = self.page.create("tr", &attrs, "");
        for text in cells {
            self.page.append(row, "td", &[], text);
        }
        row
    }

    pub fn add_row(&self, class: &str, cells: &[&str]) -> ElementRef {
        let row = self.row(class, cells);
        self.page.append_child(self.tbody, row);
        row
    }

    pub fn cell(&self, row: ElementRef, index: usize) -> ElementRef {
        self.page.query_all(Some(row), "td").unwrap()[index]
    }

    /// Clicking anywhere in `row` fills and shows the popup
    pub fn with_detail(&self, row: ElementRef, pairs: &[(&str, &str)]) {
        let popup = self.popup;
        let popup_table = self.popup_table;
        let pairs: Vec<(String, String)> = pairs.iter().map(|(h, v)| (h.to_string(), v.to_string())).collect();
        self.page.on_click(row, move |p| {
            p.clear_children(popup_table);
            for (header, value) in &pairs {
                let tr = p.append(popup_table, "tr", &[], "");
                p.append(tr, "th", &[], header);
                p.append(tr, "td", &[], value);
            }
            p.show(popup);
        });
    }

    /// Make the first cell of `parent` a toggle revealing `children` (class, cells) below it.
    ///
    /// The toggle cell swallows native clicks while collapsed, so opening the detail
    /// panel falls through to the next cell and expansion has to escalate.
    pub fn with_children(&self, parent: ElementRef, children: Vec<(&'static str, Vec<&'static str>)>) -> ElementRef {
        let toggle = self.cell(parent, 0);
        let shown: Rc<RefCell<Vec<ElementRef>>> = Rc::new(RefCell::new(Vec::new()));
        let fixture = self.handle();

        self.page.reject(toggle, ClickMethod::Native);
        self.page.on_click(toggle, move |p| {
            let mut shown = shown.borrow_mut();
            if shown.is_empty() {
                let mut after = parent;
                for (class, cells) in &children {
                    let row = fixture.row(class, cells);
                    fixture.with_detail(row, &[("분류코드", cells.get(1).copied().unwrap_or_default())]);
                    p.insert_after(after, row);
                    shown.push(row);
                    after = row;
                }
                p.accept(toggle, ClickMethod::Native);
            } else {
                for row in shown.drain(..) {
                    p.detach(row);
                }
                p.reject(toggle, ClickMethod::Native);
            }
        });
        toggle
    }

    /// Cheap copy sharing the same page
    pub fn handle(&self) -> TablePage {
        TablePage {
            page: Rc::clone(&self.page),
            tbody: self.tbody,
            popup: self.popup,
            popup_table: self.popup_table,
            pagination: self.pagination,
        }
    }
}

/// Default configuration with every delay removed
pub fn fast_config() -> HarvestConfig {
    HarvestConfig::default().with_start_url("https://example.com/act.do").without_delays()
}
