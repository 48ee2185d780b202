//! Executable document module generator.
//!
//! Emits the body of a function that, evaluated with `_jsx_runtime` in scope,
//! returns `{ default: MDXContent, frontmatter }`. Embeds are referenced by
//! component name only; the rendering layer supplies concrete renderers via
//! `props.components`.

use std::collections::BTreeSet;

use fragments_mdx::{Component, Document, EmbedNode, Node};

/// Attributes rendered as JS booleans when set to `"true"`.
const BOOLEAN_ATTRIBUTES: &[&str] = &["checked", "disabled"];

/// Generate the module body for a resolved document.
pub fn generate_module(document: &Document) -> String {
    let mut tags = BTreeSet::new();
    collect_tags(&document.children, &mut tags);

    let defaults: String = tags
        .iter()
        .map(|tag| format!("    {}: \"{}\",", tag, tag))
        .collect::<Vec<_>>()
        .join("\n");

    let used = used_components(document);
    let (destructure, checks) = if used.is_empty() {
        (String::new(), String::new())
    } else {
        let names: Vec<&str> = used.iter().map(|c| c.name()).collect();
        let checks: String = names
            .iter()
            .map(|name| format!("  if (!{name}) _missingMdxReference(\"{name}\", true);\n"))
            .collect();
        (
            format!("  const {{{}}} = _components;\n", names.join(", ")),
            checks,
        )
    };

    let children = render_children(&document.children);
    let body = match children.len() {
        0 => "_jsx(_Fragment, {})".to_string(),
        1 => format!("_jsx(_Fragment, {{\n    children: {}\n  }})", children[0]),
        _ => format!(
            "_jsxs(_Fragment, {{\n    children: [\n      {}\n    ]\n  }})",
            children.join(",\n      ")
        ),
    };

    let frontmatter = serde_json::to_string(&document.frontmatter).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"const {{Fragment: _Fragment, jsx: _jsx, jsxs: _jsxs}} = _jsx_runtime;
const frontmatter = {frontmatter};
function _createMdxContent(props) {{
  const _components = Object.assign({{
{defaults}
  }}, props.components);
{destructure}{checks}  return {body};
}}
function MDXContent(props = {{}}) {{
  const {{wrapper: MDXLayout}} = props.components || {{}};
  return MDXLayout ? _jsx(MDXLayout, Object.assign({{}}, props, {{
    children: _jsx(_createMdxContent, props)
  }})) : _createMdxContent(props);
}}
function _missingMdxReference(id, component) {{
  throw new Error("Expected " + (component ? "component" : "object") + " `" + id + "` to be defined: you likely forgot to import, pass, or provide it.");
}}
return {{
  default: MDXContent,
  frontmatter
}};
"#,
    )
}

/// Embeddable components referenced anywhere in the document.
pub fn used_components(document: &Document) -> Vec<Component> {
    let embeds = document.embeds();
    Component::ALL
        .into_iter()
        .filter(|component| embeds.iter().any(|e| e.component == *component))
        .collect()
}

fn collect_tags(nodes: &[Node], tags: &mut BTreeSet<String>) {
    for node in nodes {
        match node {
            Node::Element(element) => {
                tags.insert(element.tag.clone());
                collect_tags(&element.children, tags);
            }
            Node::InlineCode(_) => {
                tags.insert("code".to_string());
            }
            Node::Break => {
                tags.insert("br".to_string());
            }
            Node::Image(_) => {
                tags.insert("img".to_string());
            }
            Node::Directive(directive) if directive.flow => {
                tags.insert("p".to_string());
            }
            _ => {}
        }
    }
}

fn render_children(nodes: &[Node]) -> Vec<String> {
    nodes.iter().map(render_node).collect()
}

fn render_node(node: &Node) -> String {
    match node {
        Node::Text(text) => js_string(text),
        Node::InlineCode(code) => element_call("_components.code", &[], vec![js_string(code)]),
        Node::Html(html) => format!(
            "_jsx(\"span\", {{\n  dangerouslySetInnerHTML: {{__html: {}}}\n}})",
            js_string(html)
        ),
        Node::Break => "_jsx(_components.br, {})".to_string(),
        Node::Element(element) => element_call(
            &format!("_components.{}", element.tag),
            &element.attributes,
            render_children(&element.children),
        ),
        // Unresolved directives stay visible as their source text.
        Node::Directive(directive) if directive.flow => {
            element_call("_components.p", &[], vec![js_string(&directive.raw)])
        }
        Node::Directive(directive) => js_string(&directive.raw),
        Node::Image(image) => {
            let mut attributes = vec![
                ("src".to_string(), image.url.clone()),
                ("alt".to_string(), image.alt.clone()),
            ];
            if let Some(title) = &image.title {
                attributes.push(("title".to_string(), title.clone()));
            }
            element_call("_components.img", &attributes, Vec::new())
        }
        Node::Embed(embed) => render_embed(embed),
    }
}

fn render_embed(embed: &EmbedNode) -> String {
    element_call(embed.component.name(), &embed.attributes, Vec::new())
}

/// `_jsx(type, {attrs, children})`, or `_jsxs` for several children.
fn element_call(target: &str, attributes: &[(String, String)], children: Vec<String>) -> String {
    let mut props: Vec<String> = attributes
        .iter()
        .map(|(name, value)| format!("{}: {}", js_string(name), attribute_value(name, value)))
        .collect();

    let function = if children.len() > 1 { "_jsxs" } else { "_jsx" };
    match children.len() {
        0 => {}
        1 => props.push(format!("children: {}", children[0])),
        _ => props.push(format!("children: [{}]", children.join(", "))),
    }

    if props.is_empty() {
        format!("{}({}, {{}})", function, target)
    } else {
        format!("{}({}, {{\n  {}\n}})", function, target, props.join(",\n  "))
    }
}

fn attribute_value(name: &str, value: &str) -> String {
    if BOOLEAN_ATTRIBUTES.contains(&name) && value == "true" {
        "true".to_string()
    } else {
        js_string(value)
    }
}

/// JSON string literals are valid JS string literals; `<` is escaped so the
/// code can be inlined into a `<script>` tag.
fn js_string(s: &str) -> String {
    let quoted = serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
    quoted
        .replace('<', "\\u003c")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
