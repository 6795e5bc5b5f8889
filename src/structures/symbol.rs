/*!
Symbols --- the ground values of a program.

A symbol is one of:
- The constant `#inf`, smaller than every other symbol.
- A number, a signed 32 bit integer.
- A string, e.g. `"abc"`.
- A function, e.g. `age(bob, 23)`, with a name, an optional classical
  negation sign, and an ordered sequence of argument symbols.
- The constant `#sup`, greater than every other symbol.

Identifiers such as `bob` are functions of arity zero, and so carry a
signature like any other function.
Strings and functions are always distinct, regardless of spelling.

Symbols are interned in a [SymbolStore]: names and string contents are
held once in a [Rodeo](lasso::Rodeo), and each distinct function is
held once in a table, so symbol equality is a comparison of copyable
keys.
A store is owned by a grounder instance, never by the process, so
tests may construct any number of independent stores.

The ordering of symbols is total:
`#inf` < numbers < strings < functions < `#sup`, with ties within a
kind broken by value, content, or (for functions) arity, name, sign
and arguments.
As the ordering of interned keys is allocation order rather than
anything meaningful, comparisons go through
[SymbolStore::cmp_symbols].
*/

use std::cmp::Ordering;

use lasso::{Rodeo, Spur};
use rustc_hash::FxHashMap;

/// An interned name or string content.
pub type NameId = Spur;

/// An interned function, an index into the function table of the store.
pub type FunId = u32;

/// A ground value.
///
/// Cheap to copy, hash, and compare for equality.
/// Ordering requires the [SymbolStore] the symbol was made by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// `#inf`, the least symbol.
    Infimum,

    /// A number.
    Num(i32),

    /// A string, e.g. `"abc"`.
    Str(NameId),

    /// A function, e.g. `f(1, 2)`, an identifier, e.g. `f`, or a tuple, e.g. `(1, 2)`.
    Fun(FunId),

    /// `#sup`, the greatest symbol.
    Supremum,
}

/// The signature of a function symbol: name, arity, and classical negation sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Sig {
    /// The interned name of the function.
    pub name: NameId,

    /// The number of arguments.
    pub arity: u32,

    /// Whether the function is classically negated.
    pub sign: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FunData {
    name: NameId,
    sign: bool,
    args: Vec<Symbol>,
}

/// The store of interned names and functions backing [Symbol]s.
#[derive(Default)]
pub struct SymbolStore {
    names: Rodeo,
    funs: Vec<FunData>,
    fun_ids: FxHashMap<FunData, FunId>,
}

impl SymbolStore {
    /// A number symbol.
    pub fn num(&self, n: i32) -> Symbol {
        let _ = self;
        Symbol::Num(n)
    }

    /// Intern `name` without creating a symbol.
    pub fn name(&mut self, name: &str) -> NameId {
        self.names.get_or_intern(name)
    }

    /// Resolve an interned name.
    pub fn resolve(&self, name: NameId) -> &str {
        self.names.resolve(&name)
    }

    /// A string symbol with the given content.
    pub fn string(&mut self, content: &str) -> Symbol {
        Symbol::Str(self.names.get_or_intern(content))
    }

    /// An identifier, i.e. a function of arity zero.
    pub fn id(&mut self, name: &str, sign: bool) -> Symbol {
        let name = self.names.get_or_intern(name);
        self.fun(name, Vec::new(), sign)
    }

    /// An identifier over an already interned name.
    pub fn id_symbol(&mut self, name: NameId) -> Symbol {
        self.fun(name, Vec::new(), false)
    }

    /// A function symbol over already interned parts.
    ///
    /// The same (name, sign, args) triple always returns the same key.
    pub fn fun(&mut self, name: NameId, args: Vec<Symbol>, sign: bool) -> Symbol {
        let data = FunData { name, sign, args };
        if let Some(id) = self.fun_ids.get(&data) {
            return Symbol::Fun(*id);
        }
        let id = self.funs.len() as FunId;
        self.funs.push(data.clone());
        self.fun_ids.insert(data, id);
        Symbol::Fun(id)
    }

    /// A tuple symbol, i.e. a function with the empty name.
    pub fn tuple(&mut self, args: Vec<Symbol>) -> Symbol {
        let name = self.names.get_or_intern("");
        self.fun(name, args, false)
    }

    /// The signature of a function symbol, if the symbol is a function.
    pub fn sig(&self, symbol: Symbol) -> Option<Sig> {
        match symbol {
            Symbol::Fun(id) => {
                let data = &self.funs[id as usize];
                Some(Sig {
                    name: data.name,
                    arity: data.args.len() as u32,
                    sign: data.sign,
                })
            }
            _ => None,
        }
    }

    /// The arguments of a function symbol, empty for identifiers and non-functions.
    pub fn args(&self, symbol: Symbol) -> &[Symbol] {
        match symbol {
            Symbol::Fun(id) => &self.funs[id as usize].args,
            _ => &[],
        }
    }

    /// Flip the classical negation sign of a symbol.
    ///
    /// Only numbers and functions support classical negation, and flipping
    /// twice restores the original symbol: `- - x = x`.
    pub fn negate(&mut self, symbol: Symbol) -> Option<Symbol> {
        match symbol {
            Symbol::Num(n) => n.checked_neg().map(Symbol::Num),
            Symbol::Fun(id) => {
                let data = self.funs[id as usize].clone();
                Some(self.fun(data.name, data.args, !data.sign))
            }
            _ => None,
        }
    }

    /// The total order on symbols.
    ///
    /// `#inf` < numbers < strings < functions < `#sup`; numbers by value,
    /// strings by content, functions by arity, then name, then sign, then
    /// arguments.
    pub fn cmp_symbols(&self, a: Symbol, b: Symbol) -> Ordering {
        use Symbol::*;
        match (a, b) {
            (Infimum, Infimum) | (Supremum, Supremum) => Ordering::Equal,
            (Infimum, _) => Ordering::Less,
            (_, Infimum) => Ordering::Greater,
            (_, Supremum) => Ordering::Less,
            (Supremum, _) => Ordering::Greater,

            (Num(x), Num(y)) => x.cmp(&y),
            (Num(_), _) => Ordering::Less,
            (_, Num(_)) => Ordering::Greater,

            (Str(x), Str(y)) => self.names.resolve(&x).cmp(self.names.resolve(&y)),
            (Str(_), _) => Ordering::Less,
            (_, Str(_)) => Ordering::Greater,

            (Fun(x), Fun(y)) => {
                if x == y {
                    return Ordering::Equal;
                }
                let dx = &self.funs[x as usize];
                let dy = &self.funs[y as usize];
                dx.args
                    .len()
                    .cmp(&dy.args.len())
                    .then_with(|| {
                        self.names
                            .resolve(&dx.name)
                            .cmp(self.names.resolve(&dy.name))
                    })
                    .then_with(|| dx.sign.cmp(&dy.sign))
                    .then_with(|| {
                        for (p, q) in dx.args.iter().zip(dy.args.iter()) {
                            match self.cmp_symbols(*p, *q) {
                                Ordering::Equal => continue,
                                other => return other,
                            }
                        }
                        Ordering::Equal
                    })
            }
        }
    }

    /// A displayable view of a symbol.
    pub fn display(&self, symbol: Symbol) -> SymbolDisplay<'_> {
        SymbolDisplay {
            store: self,
            symbol,
        }
    }
}

/// A symbol paired with its store for printing.
pub struct SymbolDisplay<'a> {
    store: &'a SymbolStore,
    symbol: Symbol,
}

impl std::fmt::Display for SymbolDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.symbol {
            Symbol::Infimum => write!(f, "#inf"),
            Symbol::Supremum => write!(f, "#sup"),
            Symbol::Num(n) => write!(f, "{n}"),
            Symbol::Str(s) => {
                write!(f, "\"")?;
                for c in self.store.names.resolve(&s).chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Symbol::Fun(id) => {
                let data = &self.store.funs[id as usize];
                if data.sign {
                    write!(f, "-")?;
                }
                let name = self.store.names.resolve(&data.name);
                write!(f, "{name}")?;
                if !data.args.is_empty() || name.is_empty() {
                    write!(f, "(")?;
                    for (i, arg) in data.args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", self.store.display(*arg))?;
                    }
                    // A one-tuple prints with a trailing comma to stay parseable.
                    if name.is_empty() && data.args.len() == 1 {
                        write!(f, ",")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

/// Failures when parsing the textual form of a symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseSymbolError {
    /// The input ended before a symbol was complete.
    UnexpectedEnd,

    /// An unexpected character at the given byte offset.
    UnexpectedChar(usize),

    /// A number outside the 32 bit range.
    NumberOverflow,

    /// Input remained after a complete symbol.
    TrailingInput(usize),
}

impl SymbolStore {
    /// Parse the canonical textual form of a symbol, the inverse of [display](Self::display).
    pub fn parse_symbol(&mut self, input: &str) -> Result<Symbol, ParseSymbolError> {
        let mut parser = SymbolParser {
            store: self,
            input,
            at: 0,
        };
        let symbol = parser.symbol()?;
        parser.skip_space();
        if parser.at < parser.input.len() {
            return Err(ParseSymbolError::TrailingInput(parser.at));
        }
        Ok(symbol)
    }
}

struct SymbolParser<'a> {
    store: &'a mut SymbolStore,
    input: &'a str,
    at: usize,
}

impl SymbolParser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.at..]
    }

    fn skip_space(&mut self) {
        let trimmed = self.rest().trim_start();
        self.at = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.at += token.len();
            true
        } else {
            false
        }
    }

    fn symbol(&mut self) -> Result<Symbol, ParseSymbolError> {
        self.skip_space();
        if self.eat("#inf") {
            return Ok(Symbol::Infimum);
        }
        if self.eat("#sup") {
            return Ok(Symbol::Supremum);
        }
        if self.eat("-") {
            let inner = self.symbol()?;
            return self
                .store
                .negate(inner)
                .ok_or(ParseSymbolError::UnexpectedChar(self.at));
        }
        match self.rest().chars().next() {
            None => Err(ParseSymbolError::UnexpectedEnd),
            Some('"') => self.string(),
            Some('(') => self.tuple(),
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_lowercase() || c == '_' => self.function(),
            Some(_) => Err(ParseSymbolError::UnexpectedChar(self.at)),
        }
    }

    fn number(&mut self) -> Result<Symbol, ParseSymbolError> {
        let digits: String = self.rest().chars().take_while(char::is_ascii_digit).collect();
        self.at += digits.len();
        digits
            .parse::<i32>()
            .map(Symbol::Num)
            .map_err(|_| ParseSymbolError::NumberOverflow)
    }

    fn string(&mut self) -> Result<Symbol, ParseSymbolError> {
        self.at += 1;
        let mut content = String::new();
        let mut chars = self.rest().char_indices();
        loop {
            match chars.next() {
                None => return Err(ParseSymbolError::UnexpectedEnd),
                Some((i, '"')) => {
                    self.at += i + 1;
                    return Ok(self.store.string(&content));
                }
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => content.push('\n'),
                    Some((_, c)) => content.push(c),
                    None => return Err(ParseSymbolError::UnexpectedEnd),
                },
                Some((_, c)) => content.push(c),
            }
        }
    }

    fn args(&mut self) -> Result<Vec<Symbol>, ParseSymbolError> {
        let mut args = vec![self.symbol()?];
        loop {
            self.skip_space();
            if self.eat(",") {
                self.skip_space();
                // A trailing comma closes a one-tuple.
                if self.rest().starts_with(')') {
                    break;
                }
                args.push(self.symbol()?);
            } else {
                break;
            }
        }
        if !self.eat(")") {
            return Err(ParseSymbolError::UnexpectedChar(self.at));
        }
        Ok(args)
    }

    fn tuple(&mut self) -> Result<Symbol, ParseSymbolError> {
        self.at += 1;
        self.skip_space();
        if self.eat(")") {
            return Ok(self.store.tuple(Vec::new()));
        }
        let args = self.args()?;
        Ok(self.store.tuple(args))
    }

    fn function(&mut self) -> Result<Symbol, ParseSymbolError> {
        let name: String = self
            .rest()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        self.at += name.len();
        let name = self.store.names.get_or_intern(&name);
        if self.eat("(") {
            let args = self.args()?;
            Ok(self.store.fun(name, args, false))
        } else {
            Ok(self.store.fun(name, Vec::new(), false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut store = SymbolStore::default();
        let one = store.num(1);
        let a = store.id("a", false);
        let f_a_1 = {
            let f = store.name("f");
            store.fun(f, vec![a, one], false)
        };
        let f_a_1_again = {
            let f = store.name("f");
            store.fun(f, vec![a, one], false)
        };
        assert_eq!(f_a_1, f_a_1_again);
        assert_ne!(a, store.id("a", true));
    }

    #[test]
    fn strings_and_identifiers_differ() {
        let mut store = SymbolStore::default();
        let s = store.string("abc");
        let i = store.id("abc", false);
        assert_ne!(s, i);
    }

    #[test]
    fn double_negation_is_identity() {
        let mut store = SymbolStore::default();
        let x = store.id("x", false);
        let neg = store.negate(x).unwrap();
        let neg_neg = store.negate(neg).unwrap();
        assert_eq!(x, neg_neg);
        let neg3 = store.negate(neg_neg).unwrap();
        assert_eq!(neg, neg3);
    }

    #[test]
    fn total_order() {
        let mut store = SymbolStore::default();
        let items = [
            Symbol::Infimum,
            store.num(-3),
            store.num(7),
            store.string("a"),
            store.string("b"),
            store.id("a", false),
            store.id("b", false),
            Symbol::Supremum,
        ];
        for window in items.windows(2) {
            assert_eq!(store.cmp_symbols(window[0], window[1]), Ordering::Less);
        }
    }

    #[test]
    fn function_order_is_arity_first() {
        let mut store = SymbolStore::default();
        let one = store.num(1);
        let two = store.num(2);
        let g = store.name("g");
        let f = store.name("f");
        let g1 = store.fun(g, vec![one], false);
        let f12 = store.fun(f, vec![one, two], false);
        assert_eq!(store.cmp_symbols(g1, f12), Ordering::Less);
    }

    #[test]
    fn print_parse_round_trip() {
        let mut store = SymbolStore::default();
        let one = store.num(1);
        let s = store.string("say \"hi\"");
        let a = store.id("a", true);
        let f = store.name("f");
        let nested = store.fun(f, vec![one, s, a], false);
        let tup = store.tuple(vec![nested, one]);
        for symbol in [Symbol::Infimum, one, s, a, nested, tup, Symbol::Supremum] {
            let printed = store.display(symbol).to_string();
            let parsed = store.parse_symbol(&printed).unwrap();
            assert_eq!(symbol, parsed, "round trip failed on {printed}");
        }
    }

    #[test]
    fn one_tuple_round_trip() {
        let mut store = SymbolStore::default();
        let one = store.num(1);
        let tup = store.tuple(vec![one]);
        let printed = store.display(tup).to_string();
        assert_eq!(printed, "(1,)");
        assert_eq!(store.parse_symbol(&printed).unwrap(), tup);
    }
}
