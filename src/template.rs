//! Mustache template parser with caching
//!
//! Supported syntax:
//! - `{{path}}` escaped output, `{{{path}}}` raw output
//! - `{{#helper params... key=value}}...{{else}}...{{/helper}}` blocks
//! - `{{helper params...}}` inline helper calls (no block)
//! - `{{! comment}}`
//!
//! Templates are tokenized once; parsed programs are cached and shared
//! through `Arc`.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::ScopeError;
use crate::path::KeyPath;

/// Parameter or hash value as written in the template
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Property path: `post.title`, `this`
    Path(KeyPath),
    /// String, number, boolean or null literal
    Literal(Value),
}

impl Expr {
    pub fn as_path(&self) -> Option<&KeyPath> {
        match self {
            Expr::Path(p) => Some(p),
            Expr::Literal(_) => None,
        }
    }
}

/// Parsed template body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// `{{expr}}`, or an inline helper call when params/hash are present
    Mustache(MustacheNode),
    Block(BlockNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MustacheNode {
    pub expr: Expr,
    pub params: Vec<Expr>,
    pub hash: Vec<(String, Expr)>,
    pub escaped: bool,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub helper: String,
    pub params: Vec<Expr>,
    pub hash: Vec<(String, Expr)>,
    pub program: Arc<Program>,
    pub inverse: Option<Arc<Program>>,
    pub position: usize,
}

/// Raw tag found by the tokenizer
#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Open { content: &'a str, position: usize },
    Close { content: &'a str, position: usize },
    Else { position: usize },
    Mustache { content: &'a str, escaped: bool, position: usize },
}

/// Split source into text and tags
fn tokenize(source: &str) -> Result<Vec<Token<'_>>, ScopeError> {
    let mut tokens = Vec::new();
    let mut rest_start = 0;

    while let Some(offset) = source[rest_start..].find("{{") {
        let start = rest_start + offset;
        if start > rest_start {
            tokens.push(Token::Text(&source[rest_start..start]));
        }

        let triple = source[start..].starts_with("{{{");
        let (open_len, close) = if triple { (3, "}}}") } else { (2, "}}") };
        let inner_start = start + open_len;
        let inner_end = inner_start + find_close(&source[inner_start..], close, start)?;
        let content = source[inner_start..inner_end].trim();
        rest_start = inner_end + close.len();

        if triple {
            tokens.push(Token::Mustache {
                content,
                escaped: false,
                position: start,
            });
            continue;
        }

        if let Some(rest) = content.strip_prefix('#') {
            tokens.push(Token::Open {
                content: rest.trim(),
                position: start,
            });
        } else if let Some(rest) = content.strip_prefix('/') {
            tokens.push(Token::Close {
                content: rest.trim(),
                position: start,
            });
        } else if content.starts_with('!') {
            // comment
        } else if content == "else" {
            tokens.push(Token::Else { position: start });
        } else {
            tokens.push(Token::Mustache {
                content,
                escaped: true,
                position: start,
            });
        }
    }

    if rest_start < source.len() {
        tokens.push(Token::Text(&source[rest_start..]));
    }

    Ok(tokens)
}

/// Offset of the closing delimiter, skipping quoted literals
///
/// Comment bodies are free text, so quotes there are not paired.
fn find_close(text: &str, close: &str, position: usize) -> Result<usize, ScopeError> {
    let unclosed = || ScopeError::TemplateParse {
        position,
        details: format!("unclosed tag, expected '{close}'"),
    };
    if text.trim_start().starts_with('!') {
        return text.find(close).ok_or_else(unclosed);
    }

    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if text[i..].starts_with(close) => return Ok(i),
            None => {}
        }
    }

    match quote {
        Some(_) => Err(ScopeError::TemplateParse {
            position,
            details: "unterminated string literal".to_string(),
        }),
        None => Err(unclosed()),
    }
}

/// One word inside a tag: positional expression or `key=value`
#[derive(Debug)]
enum Word {
    Positional(Expr),
    Named(String, Expr),
}

/// Split tag content into words, honouring quoted strings
fn split_words(content: &str, position: usize) -> Result<Vec<Word>, ScopeError> {
    let mut words = Vec::new();
    let mut chars = content.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '"' || ch == '\'' {
            chars.next();
            let text = read_quoted(&mut chars, ch, position + start)?;
            words.push(Word::Positional(Expr::Literal(Value::String(text))));
            continue;
        }

        // Bare word, possibly key=value with a quoted value
        let mut end = content.len();
        let mut named: Option<(String, Expr)> = None;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() {
                end = i;
                break;
            }
            if c == '=' {
                let key = content[start..i].to_string();
                chars.next();
                let value = match chars.peek() {
                    Some(&(vi, q)) if q == '"' || q == '\'' => {
                        chars.next();
                        Expr::Literal(Value::String(read_quoted(&mut chars, q, position + vi)?))
                    }
                    Some(&(vi, _)) => {
                        let mut vend = content.len();
                        while let Some(&(j, c)) = chars.peek() {
                            if c.is_whitespace() {
                                vend = j;
                                break;
                            }
                            chars.next();
                        }
                        parse_bare(&content[vi..vend], position)?
                    }
                    None => {
                        return Err(ScopeError::TemplateParse {
                            position: position + i,
                            details: format!("missing value for '{key}='"),
                        })
                    }
                };
                named = Some((key, value));
                break;
            }
            chars.next();
        }

        match named {
            Some((key, value)) => words.push(Word::Named(key, value)),
            None => words.push(Word::Positional(parse_bare(&content[start..end], position)?)),
        }
    }

    Ok(words)
}

fn read_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
    quote: char,
    position: usize,
) -> Result<String, ScopeError> {
    let mut text = String::new();
    let mut escaped = false;
    for (_, c) in chars.by_ref() {
        if escaped {
            text.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok(text);
        } else {
            text.push(c);
        }
    }
    Err(ScopeError::TemplateParse {
        position,
        details: "unterminated string literal".to_string(),
    })
}

/// Literal keywords, numbers, or a property path
fn parse_bare(word: &str, position: usize) -> Result<Expr, ScopeError> {
    match word {
        "true" => return Ok(Expr::Literal(Value::Bool(true))),
        "false" => return Ok(Expr::Literal(Value::Bool(false))),
        "null" | "undefined" => return Ok(Expr::Literal(Value::Null)),
        _ => {}
    }

    let numeric = word
        .strip_prefix('-')
        .unwrap_or(word)
        .starts_with(|c: char| c.is_ascii_digit());
    if numeric {
        if let Ok(n) = word.parse::<i64>() {
            return Ok(Expr::Literal(Value::from(n)));
        }
        if let Ok(f) = word.parse::<f64>() {
            return Ok(Expr::Literal(Value::from(f)));
        }
    }

    KeyPath::parse(word)
        .map(Expr::Path)
        .map_err(|_| ScopeError::TemplateParse {
            position,
            details: format!("invalid expression '{word}'"),
        })
}

struct Signature {
    name: Expr,
    params: Vec<Expr>,
    hash: Vec<(String, Expr)>,
}

fn parse_signature(content: &str, position: usize) -> Result<Signature, ScopeError> {
    let mut words = split_words(content, position)?.into_iter();
    let name = match words.next() {
        Some(Word::Positional(expr)) => expr,
        Some(Word::Named(key, _)) => {
            return Err(ScopeError::TemplateParse {
                position,
                details: format!("expected an expression before '{key}='"),
            })
        }
        None => {
            return Err(ScopeError::TemplateParse {
                position,
                details: "empty tag".to_string(),
            })
        }
    };

    let mut params = Vec::new();
    let mut hash: Vec<(String, Expr)> = Vec::new();
    for word in words {
        match word {
            Word::Positional(expr) if hash.is_empty() => params.push(expr),
            Word::Positional(_) => {
                return Err(ScopeError::TemplateParse {
                    position,
                    details: "positional arguments must come before key=value pairs".to_string(),
                })
            }
            Word::Named(key, value) => {
                if hash.iter().any(|(k, _)| *k == key) {
                    return Err(ScopeError::TemplateParse {
                        position,
                        details: format!("duplicate option '{key}'"),
                    });
                }
                hash.push((key, value));
            }
        }
    }

    Ok(Signature { name, params, hash })
}

/// Block under construction
struct Frame {
    helper: String,
    params: Vec<Expr>,
    hash: Vec<(String, Expr)>,
    position: usize,
    program: Vec<Node>,
    inverse: Option<Vec<Node>>,
}

impl Frame {
    fn current(&mut self) -> &mut Vec<Node> {
        match self.inverse.as_mut() {
            Some(inverse) => inverse,
            None => &mut self.program,
        }
    }
}

/// Parse template source into a program (uncached)
pub fn parse(source: &str) -> Result<Program, ScopeError> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokenize(source)? {
        let target = |stack: &mut Vec<Frame>, root: &mut Vec<Node>, node: Node| match stack.last_mut() {
            Some(frame) => frame.current().push(node),
            None => root.push(node),
        };

        match token {
            Token::Text(text) => target(&mut stack, &mut root, Node::Text(text.to_string())),
            Token::Mustache {
                content,
                escaped,
                position,
            } => {
                let sig = parse_signature(content, position)?;
                target(
                    &mut stack,
                    &mut root,
                    Node::Mustache(MustacheNode {
                        expr: sig.name,
                        params: sig.params,
                        hash: sig.hash,
                        escaped,
                        position,
                    }),
                );
            }
            Token::Open { content, position } => {
                let sig = parse_signature(content, position)?;
                let helper = match sig.name {
                    Expr::Path(p) if p.is_identifier() => p.as_str().to_string(),
                    other => {
                        return Err(ScopeError::TemplateParse {
                            position,
                            details: format!("invalid block helper name {other:?}"),
                        })
                    }
                };
                stack.push(Frame {
                    helper,
                    params: sig.params,
                    hash: sig.hash,
                    position,
                    program: Vec::new(),
                    inverse: None,
                });
            }
            Token::Else { position } => match stack.last_mut() {
                Some(frame) if frame.inverse.is_none() => frame.inverse = Some(Vec::new()),
                Some(frame) => {
                    return Err(ScopeError::TemplateParse {
                        position,
                        details: format!("duplicate {{{{else}}}} in {{{{#{}}}}}", frame.helper),
                    })
                }
                None => {
                    return Err(ScopeError::TemplateParse {
                        position,
                        details: "{{else}} outside of a block".to_string(),
                    })
                }
            },
            Token::Close { content, position } => {
                let Some(frame) = stack.pop() else {
                    return Err(ScopeError::TemplateParse {
                        position,
                        details: format!("unexpected {{{{/{content}}}}}"),
                    });
                };
                if frame.helper != content {
                    return Err(ScopeError::TemplateParse {
                        position,
                        details: format!(
                            "{{{{#{}}}}} closed by {{{{/{content}}}}}",
                            frame.helper
                        ),
                    });
                }
                let block = Node::Block(BlockNode {
                    helper: frame.helper,
                    params: frame.params,
                    hash: frame.hash,
                    program: Arc::new(Program {
                        nodes: frame.program,
                    }),
                    inverse: frame.inverse.map(|nodes| Arc::new(Program { nodes })),
                    position: frame.position,
                });
                target(&mut stack, &mut root, block);
            }
        }
    }

    if let Some(frame) = stack.last() {
        return Err(ScopeError::TemplateParse {
            position: frame.position,
            details: format!("unclosed {{{{#{}}}}}", frame.helper),
        });
    }

    Ok(Program { nodes: root })
}

/// Parse cache keyed by source text
pub struct TemplateCache {
    cache: DashMap<String, Arc<Program>>,
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCache {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Parse (or reuse) a program
    pub fn compile(&self, source: &str) -> Result<Arc<Program>, ScopeError> {
        if let Some(cached) = self.cache.get(source) {
            return Ok(Arc::clone(&cached));
        }
        let program = Arc::new(parse(source)?);
        self.cache.insert(source.to_string(), Arc::clone(&program));
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Global template cache instance
pub static TEMPLATE_CACHE: Lazy<TemplateCache> = Lazy::new(TemplateCache::new);

/// Convenience function for compiling through the global cache
pub fn compile(source: &str) -> Result<Arc<Program>, ScopeError> {
    TEMPLATE_CACHE.compile(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Expr {
        Expr::Path(KeyPath::parse(p).unwrap())
    }

    #[test]
    fn parse_plain_text() {
        let program = parse("simple text").unwrap();
        assert_eq!(program.nodes, vec![Node::Text("simple text".to_string())]);
    }

    #[test]
    fn parse_mustaches() {
        let program = parse("Hi {{user.name}} {{{raw}}}").unwrap();
        assert_eq!(program.nodes.len(), 4);
        match &program.nodes[1] {
            Node::Mustache(m) => {
                assert_eq!(m.expr, path("user.name"));
                assert!(m.escaped);
                assert!(m.params.is_empty());
            }
            other => panic!("expected mustache, got {other:?}"),
        }
        assert!(matches!(&program.nodes[3], Node::Mustache(m) if !m.escaped));
    }

    #[test]
    fn parse_with_as_block() {
        let program = parse("{{#with post as p}}{{p.title}}{{/with}}").unwrap();
        let Node::Block(block) = &program.nodes[0] else {
            panic!("expected block");
        };
        assert_eq!(block.helper, "with");
        assert_eq!(block.params, vec![path("post"), path("as"), path("p")]);
        assert_eq!(block.program.nodes.len(), 1);
        assert!(block.inverse.is_none());
    }

    #[test]
    fn parse_else_and_hash() {
        let program =
            parse("{{#with items as list controller='listCtrl'}}yes{{else}}no{{/with}}").unwrap();
        let Node::Block(block) = &program.nodes[0] else {
            panic!("expected block");
        };
        assert_eq!(
            block.hash,
            vec![("controller".to_string(), Expr::Literal(json!("listCtrl")))]
        );
        assert_eq!(block.program.nodes, vec![Node::Text("yes".into())]);
        assert_eq!(
            block.inverse.as_ref().unwrap().nodes,
            vec![Node::Text("no".into())]
        );
    }

    #[test]
    fn parse_literals() {
        let program = parse(r#"{{#with "hello world" as greeting}}{{greeting}}{{/with}}{{x 1 -2 2.5 true null}}"#)
            .unwrap();
        let Node::Block(block) = &program.nodes[0] else {
            panic!("expected block");
        };
        assert_eq!(block.params[0], Expr::Literal(json!("hello world")));

        let Node::Mustache(m) = &program.nodes[1] else {
            panic!("expected mustache");
        };
        assert_eq!(
            m.params,
            vec![
                Expr::Literal(json!(1)),
                Expr::Literal(json!(-2)),
                Expr::Literal(json!(2.5)),
                Expr::Literal(json!(true)),
                Expr::Literal(json!(null)),
            ]
        );
    }

    #[test]
    fn parse_nested_blocks() {
        let program =
            parse("{{#with a as x}}{{#with x.b as y}}{{y}}{{/with}}{{/with}}").unwrap();
        let Node::Block(outer) = &program.nodes[0] else {
            panic!("expected block");
        };
        assert!(matches!(&outer.program.nodes[0], Node::Block(inner) if inner.helper == "with"));
    }

    #[test]
    fn comments_are_dropped() {
        let program = parse("a{{! ignored }}b").unwrap();
        assert_eq!(
            program.nodes,
            vec![Node::Text("a".into()), Node::Text("b".into())]
        );
    }

    #[test]
    fn close_delimiter_inside_quotes() {
        let program = parse("{{#with \"a}}b\" as x}}{{x}}{{/with}}").unwrap();
        let Node::Block(block) = &program.nodes[0] else {
            panic!("expected block");
        };
        assert_eq!(block.params[0], Expr::Literal(json!("a}}b")));
        assert_eq!(block.params.len(), 3);

        let program = parse("{{x '}}}'}}").unwrap();
        assert!(matches!(&program.nodes[0], Node::Mustache(m) if m.params == vec![Expr::Literal(json!("}}}"))]));

        // comment text is not quote-aware
        let program = parse("a{{! it's }}b").unwrap();
        assert_eq!(program.nodes.len(), 2);
    }

    #[test]
    fn parse_errors() {
        let cases = [
            ("{{#with a as b}}", "unclosed {{#with}}"),
            ("{{#with a}}{{/if}}", "closed by"),
            ("{{/with}}", "unexpected"),
            ("{{else}}", "outside of a block"),
            ("{{#with a}}x{{else}}y{{else}}z{{/with}}", "duplicate"),
            ("{{name", "unclosed tag"),
            ("{{x 'open}}", "unterminated"),
            ("{{#with a controller=}}{{/with}}", "missing value"),
        ];
        for (source, expected) in cases {
            let err = parse(source).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{source:?}: {err} should mention {expected:?}"
            );
        }
    }

    #[test]
    fn cache_reuse() {
        let cache = TemplateCache::new();
        let a = cache.compile("{{a}}").unwrap();
        let b = cache.compile("{{a}}").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }
}
