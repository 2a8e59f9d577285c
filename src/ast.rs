use std::fmt::{Display, Write};

use crate::{
    arena::{Arena, Id},
    span::Span,
    tokenizer::{Token, TokenType},
};

pub type NodeId<'a> = Id<Node<'a>>;

/// Every construct is a binary node.
///
/// - binary operators use both children
/// - prefix `-` and `ASSERT` leave `left` empty
/// - postfix `!` leaves `right` empty
/// - an application has the callee (or nothing, for plain grouping) on the
///   left and the parenthesized expression on the right
/// - `a, b, c` leans right: `,(a, ,(b, c))`
#[derive(Debug, Clone, PartialEq)]
pub struct Node<'a> {
    pub token: Token<'a>,
    pub left: Option<NodeId<'a>>,
    pub right: Option<NodeId<'a>>,
    /// Levels in this subtree, 1 for a leaf.
    pub height: usize,
}

impl<'a> Node<'a> {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Owner of every syntax node of a program.
#[derive(Debug, Default)]
pub struct SyntaxTree<'a> {
    nodes: Arena<Node<'a>>,
}

impl<'a> SyntaxTree<'a> {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
        }
    }

    pub fn add(
        &mut self,
        token: Token<'a>,
        left: Option<NodeId<'a>>,
        right: Option<NodeId<'a>>,
    ) -> NodeId<'a> {
        let height = 1 + [left, right]
            .into_iter()
            .flatten()
            .map(|child| self.node(child).height)
            .max()
            .unwrap_or(0);
        self.nodes.take_or_allocate(Node {
            token,
            left,
            right,
            height,
        })
    }

    pub fn leaf(&mut self, token: Token<'a>) -> NodeId<'a> {
        self.add(token, None, None)
    }

    pub fn node(&self, id: NodeId<'a>) -> &Node<'a> {
        &self.nodes[id]
    }

    /// Releases `root` and everything beneath it, children first.
    pub fn release(&mut self, root: NodeId<'a>) {
        let Some(node) = self.nodes.get(root) else {
            return;
        };
        let (left, right) = (node.left, node.right);
        if let Some(left) = left {
            self.release(left);
        }
        if let Some(right) = right {
            self.release(right);
        }
        self.nodes.release(root);
    }

    pub fn live(&self) -> usize {
        self.nodes.live()
    }

    pub fn footprint(&self) -> usize {
        self.nodes.footprint()
    }

    /// Source span covered by the whole subtree.
    pub fn span(&self, id: NodeId<'a>) -> Span {
        let node = self.node(id);
        let mut span = node.token.span;
        if let Some(left) = node.left {
            span = span + self.span(left);
        }
        if let Some(right) = node.right {
            span = span + self.span(right);
        }
        span
    }

    /// Flattens a right-leaning comma chain into its elements.
    pub fn list(&self, id: Option<NodeId<'a>>) -> Vec<NodeId<'a>> {
        let mut elements = Vec::new();
        if let Some(id) = id {
            self.collect_list(id, &mut elements);
        }
        elements
    }

    fn collect_list(&self, id: NodeId<'a>, elements: &mut Vec<NodeId<'a>>) {
        let node = self.node(id);
        if node.token.is(TokenType::Comma) {
            if let Some(left) = node.left {
                self.collect_list(left, elements);
            }
            if let Some(right) = node.right {
                self.collect_list(right, elements);
            }
        } else {
            elements.push(id);
        }
    }

    pub fn infix(&self, root: NodeId<'a>) -> Infix<'_, 'a> {
        Infix { tree: self, root }
    }

    /// One line per node: `Leaf`/`Branch`, the left(0)/right(1) path from the
    /// root, and the node's text.
    pub fn dump(&self, root: NodeId<'a>) -> String {
        let mut out = String::new();
        self.dump_node(root, &mut String::new(), &mut out);
        out
    }

    fn dump_node(&self, id: NodeId<'a>, path: &mut String, out: &mut String) {
        let node = self.node(id);
        let kind = if node.is_leaf() { "Leaf" } else { "Branch" };
        let text = match node.token.token_type {
            TokenType::Number | TokenType::Identifier => node.token.lexeme.to_string(),
            other => other.to_string(),
        };
        let _ = writeln!(out, "{kind} : {path} : `{text}`");

        for (child, bit) in [(node.left, '0'), (node.right, '1')] {
            if let Some(child) = child {
                path.push(bit);
                self.dump_node(child, path, out);
                path.pop();
            }
        }
    }
}

/// Fully parenthesized infix rendering that parses back to an equivalent tree.
pub struct Infix<'t, 'a> {
    tree: &'t SyntaxTree<'a>,
    root: NodeId<'a>,
}

impl<'t, 'a> Display for Infix<'t, 'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let node = self.tree.node(self.root);
        let child = |id: Option<NodeId<'a>>| id.map(|root| Infix { tree: self.tree, root });

        match (node.token.token_type, child(node.left), child(node.right)) {
            (TokenType::Number | TokenType::Identifier, _, _) => write!(f, "{}", node.token.lexeme),
            (TokenType::Application, Some(callee), Some(inner)) => write!(f, "{callee}({inner})"),
            (TokenType::Application, Some(callee), None) => write!(f, "{callee}()"),
            (TokenType::Application, None, Some(inner)) => write!(f, "({inner})"),
            (TokenType::Assert, _, Some(operand)) => write!(f, "ASSERT {operand}"),
            (TokenType::Bang, Some(operand), _) => write!(f, "({operand}!)"),
            (op, None, Some(operand)) => write!(f, "({op}{operand})"),
            (TokenType::Comma, Some(left), Some(right)) => write!(f, "{left}, {right}"),
            (TokenType::Equal, Some(left), Some(right)) => write!(f, "{left} = {right}"),
            (op, Some(left), Some(right)) => write!(f, "({left} {op} {right})"),
            (op, _, _) => write!(f, "{op}"),
        }
    }
}
