use marmot_ground::{
    config::Config,
    context::Grounder,
    output::{Event, RecordingEmitter},
    reports::DiagnosticKind,
    structures::{
        literal::{BodyLiteral, Relation},
        rule::{Head, Rule, Statement},
    },
};

#[test]
fn undefined_operations_drop_the_rule_not_the_step() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // p(1/0).  q(1).
    let broken = {
        let mut scope = grounder.rule_scope("t");
        let one = scope.num(1);
        let zero = scope.num(0);
        let div = scope.binary(marmot_ground::structures::term::BinOp::Div, one, zero);
        let head = scope.fun("p", vec![div]);
        Rule {
            head: Head::Atom(head),
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    let sound = {
        let mut scope = grounder.rule_scope("t");
        let one = scope.num(1);
        let head = scope.fun("q", vec![one]);
        Rule {
            head: Head::Atom(head),
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(broken));
    program.add(Statement::Rule(sound));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // The broken head becomes a constraint with an empty body is not
    // wanted either: the rule simply produces nothing, with a warning.
    assert_eq!(out.facts().count(), 1);
    let diagnostics = grounder.take_diagnostics();
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::OperationUndefined));
}

#[test]
fn cyclic_defines_stop_the_step() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // #const a = b.  #const b = a.  p(a).
    let (a_value, b_value, rule) = {
        let mut scope = grounder.rule_scope("t");
        let b_ref = scope.id("b");
        let a_ref = scope.id("a");
        let a_arg = scope.id("a");
        let head = scope.fun("p", vec![a_arg]);
        (
            b_ref,
            a_ref,
            Rule {
                head: Head::Atom(head),
                body: Vec::new(),
                loc: scope.loc(),
            },
        )
    };
    let loc = rule.loc;
    let a = grounder.store.name("a");
    let b = grounder.store.name("b");
    program.add(Statement::Define {
        name: a,
        value: a_value,
        default: false,
        loc,
    });
    program.add(Statement::Define {
        name: b,
        value: b_value,
        default: false,
        loc,
    });
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // Errors halt the step after rewriting: no ground output at all.
    assert_eq!(
        out.events,
        vec![Event::InitProgram(false), Event::BeginStep, Event::EndStep]
    );
    let diagnostics = grounder.take_diagnostics();
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::CyclicDefine));
}

#[test]
fn pooled_heads_expand() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // p(1; 2; 3).
    let rule = {
        let mut scope = grounder.rule_scope("t");
        let alternatives = (1..=3).map(|n| scope.num(n)).collect::<Vec<_>>();
        let pool = scope.pool(alternatives);
        let head = scope.fun("p", vec![pool]);
        Rule {
            head: Head::Atom(head),
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();
    assert_eq!(out.facts().count(), 3);
}

#[test]
fn comparison_chains_unchain() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // p(1..5).  q(X) :- p(X), 1 < X < 4.
    let facts = {
        let mut scope = grounder.rule_scope("t");
        let args = vec![scope.interval(1, 5)];
        let head = scope.fun("p", args);
        Rule {
            head: Head::Atom(head),
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(facts));
    let rule = {
        let mut scope = grounder.rule_scope("t");
        let x = scope.var("X");
        let head = scope.fun("q", vec![x.clone()]);
        let p_atom = scope.fun("p", vec![x.clone()]);
        let one = scope.num(1);
        let four = scope.num(4);
        let chain = BodyLiteral::Comparison {
            neg: false,
            left: one,
            rights: vec![(Relation::Lt, x), (Relation::Lt, four)],
            assign: false,
        };
        Rule {
            head: Head::Atom(head),
            body: vec![BodyLiteral::pred(p_atom), chain],
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // q(2) and q(3).
    let q = grounder.store.name("q");
    let two = grounder.store.num(2);
    let q2 = grounder.store.fun(q, vec![two], false);
    let q_sig = grounder.store.sig(q2).unwrap();
    assert_eq!(grounder.domains.domain(q_sig).unwrap().len(), 2);
}

#[test]
fn negated_chains_split_disjunctively() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // p(1..5).  q(X) :- p(X), not 2 <= X <= 4.
    let facts = {
        let mut scope = grounder.rule_scope("t");
        let args = vec![scope.interval(1, 5)];
        let head = scope.fun("p", args);
        Rule {
            head: Head::Atom(head),
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(facts));
    let rule = {
        let mut scope = grounder.rule_scope("t");
        let x = scope.var("X");
        let head = scope.fun("q", vec![x.clone()]);
        let p_atom = scope.fun("p", vec![x.clone()]);
        let two = scope.num(2);
        let four = scope.num(4);
        let chain = BodyLiteral::Comparison {
            neg: true,
            left: two,
            rights: vec![(Relation::Le, x), (Relation::Le, four)],
            assign: false,
        };
        Rule {
            head: Head::Atom(head),
            body: vec![BodyLiteral::pred(p_atom), chain],
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // q(1) and q(5): outside the chain on either side.
    let q = grounder.store.name("q");
    let one = grounder.store.num(1);
    let five = grounder.store.num(5);
    let q1 = grounder.store.fun(q, vec![one], false);
    let q5 = grounder.store.fun(q, vec![five], false);
    let q_sig = grounder.store.sig(q1).unwrap();
    assert_eq!(grounder.domains.domain(q_sig).unwrap().len(), 2);
    assert!(grounder.domains.uid(q_sig, q1).is_some());
    assert!(grounder.domains.uid(q_sig, q5).is_some());
}

#[test]
fn default_defines_yield() {
    let mut grounder = Grounder::from_config(Config::default());
    let n = grounder.store.num(10);
    grounder.add_default_define("n", n);

    let mut program = grounder.program();
    // #const n = 3.  p(1..n).
    let (value, rule) = {
        let mut scope = grounder.rule_scope("t");
        let three = scope.num(3);
        let one = scope.num(1);
        let n_ref = scope.id("n");
        let range = scope.range(one, n_ref);
        let head = scope.fun("p", vec![range]);
        (
            three,
            Rule {
                head: Head::Atom(head),
                body: Vec::new(),
                loc: scope.loc(),
            },
        )
    };
    let loc = rule.loc;
    let n_name = grounder.store.name("n");
    program.add(Statement::Define {
        name: n_name,
        value,
        default: false,
        loc,
    });
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // The in-program define wins over the injected default.
    assert_eq!(out.facts().count(), 3);
}
