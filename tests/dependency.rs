use marmot_ground::{
    config::Config,
    context::Grounder,
    output::RecordingEmitter,
    structures::{
        literal::BodyLiteral,
        rule::{Head, Rule, Statement},
    },
};

/// Transitive closure over a chain: the classic semi-naive workload.
#[test]
fn transitive_closure() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // edge(1,2). edge(2,3). edge(3,4).
    for (u, v) in [(1, 2), (2, 3), (3, 4)] {
        let fact = {
            let mut scope = grounder.rule_scope("t");
            let u = scope.num(u);
            let v = scope.num(v);
            let head = scope.fun("edge", vec![u, v]);
            Rule {
                head: Head::Atom(head),
                body: Vec::new(),
                loc: scope.loc(),
            }
        };
        program.add(Statement::Rule(fact));
    }

    // path(X,Y) :- edge(X,Y).
    let base = {
        let mut scope = grounder.rule_scope("t");
        let x = scope.var("X");
        let y = scope.var("Y");
        let head = scope.fun("path", vec![x.clone(), y.clone()]);
        let edge = scope.fun("edge", vec![x, y]);
        Rule {
            head: Head::Atom(head),
            body: vec![BodyLiteral::pred(edge)],
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(base));

    // path(X,Z) :- path(X,Y), edge(Y,Z).
    let step = {
        let mut scope = grounder.rule_scope("t");
        let x = scope.var("X");
        let y = scope.var("Y");
        let z = scope.var("Z");
        let head = scope.fun("path", vec![x.clone(), z.clone()]);
        let path = scope.fun("path", vec![x, y.clone()]);
        let edge = scope.fun("edge", vec![y, z]);
        Rule {
            head: Head::Atom(head),
            body: vec![BodyLiteral::pred(path), BodyLiteral::pred(edge)],
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(step));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // Six paths over the chain, each derived exactly once.
    let path = grounder.store.name("path");
    let mut expected = Vec::new();
    for u in 1..=3 {
        for v in (u + 1)..=4 {
            let a = grounder.store.num(u);
            let b = grounder.store.num(v);
            expected.push(grounder.store.fun(path, vec![a, b], false));
        }
    }
    for atom in &expected {
        let sig = grounder.store.sig(*atom).unwrap();
        assert!(
            grounder.domains.uid(sig, *atom).is_some(),
            "missing {}",
            grounder.store.display(*atom)
        );
    }
    let sig = grounder.store.sig(expected[0]).unwrap();
    assert_eq!(grounder.domains.domain(sig).unwrap().len(), 6);

    // All facts, and no duplicate emissions.
    assert_eq!(out.facts().count(), 3 + 6);
    assert_eq!(out.rules().count(), 3 + 6);
}

/// Negation across components grounds the negative test away when the
/// atom is decided.
#[test]
fn stratified_negation() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // p(1..3).  r(2).  q(X) :- p(X), not r(X).
    let facts = {
        let mut scope = grounder.rule_scope("t");
        let args = vec![scope.interval(1, 3)];
        let head = scope.fun("p", args);
        Rule {
            head: Head::Atom(head),
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(facts));
    let r_fact = {
        let mut scope = grounder.rule_scope("t");
        let two = scope.num(2);
        let head = scope.fun("r", vec![two]);
        Rule {
            head: Head::Atom(head),
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(r_fact));
    let rule = {
        let mut scope = grounder.rule_scope("t");
        let x = scope.var("X");
        let head = scope.fun("q", vec![x.clone()]);
        let p_atom = scope.fun("p", vec![x.clone()]);
        let r_atom = scope.fun("r", vec![x]);
        let not_r = scope.not(r_atom);
        Rule {
            head: Head::Atom(head),
            body: vec![BodyLiteral::pred(p_atom), not_r],
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // q(1) and q(3); the fact r(2) kills the q(2) instance outright.
    let q = grounder.store.name("q");
    let q_sig = {
        let one = grounder.store.num(1);
        let q1 = grounder.store.fun(q, vec![one], false);
        grounder.store.sig(q1).unwrap()
    };
    assert_eq!(grounder.domains.domain(q_sig).unwrap().len(), 2);
    for n in [1, 3] {
        let num = grounder.store.num(n);
        let atom = grounder.store.fun(q, vec![num], false);
        assert!(grounder.domains.uid(q_sig, atom).is_some());
    }
}

/// A disjunctive head collects its ground elements into one rule.
#[test]
fn disjunction() {
    use marmot_ground::output::HeadKind;
    use marmot_ground::structures::rule::CondHead;

    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // {c}.  a ; b :- c.
    let choice = {
        let mut scope = grounder.rule_scope("t");
        let c = scope.id("c");
        Rule {
            head: Head::Choice {
                left: None,
                right: None,
                elements: vec![CondHead {
                    atom: c,
                    condition: Vec::new(),
                }],
            },
            body: Vec::new(),
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(choice));
    let rule = {
        let mut scope = grounder.rule_scope("t");
        let a = scope.id("a");
        let b = scope.id("b");
        let c = scope.id("c");
        Rule {
            head: Head::Disjunction(vec![
                CondHead {
                    atom: a,
                    condition: Vec::new(),
                },
                CondHead {
                    atom: b,
                    condition: Vec::new(),
                },
            ]),
            body: vec![BodyLiteral::pred(c)],
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    let disjunctive: Vec<_> = out
        .rules()
        .filter(|(kind, head, _)| **kind == HeadKind::Disjunctive && head.len() == 2)
        .collect();
    assert_eq!(disjunctive.len(), 1);
    assert_eq!(disjunctive[0].2.len(), 1, "the body carries c");
}

/// A conditional literal holds when the conditioned literal holds for
/// every instance of its condition.
#[test]
fn conditional_literal() {
    use marmot_ground::structures::literal::CondLiteral;

    let mut conclusion = Vec::new();
    for a_facts in [vec![1, 2], vec![1]] {
        let mut grounder = Grounder::from_config(Config::default());
        let mut program = grounder.program();

        // b(1). b(2).  a(…) facts.  c :- a(X) : b(X).
        for n in [1, 2] {
            let fact = {
                let mut scope = grounder.rule_scope("t");
                let num = scope.num(n);
                let head = scope.fun("b", vec![num]);
                Rule {
                    head: Head::Atom(head),
                    body: Vec::new(),
                    loc: scope.loc(),
                }
            };
            program.add(Statement::Rule(fact));
        }
        for &n in &a_facts {
            let fact = {
                let mut scope = grounder.rule_scope("t");
                let num = scope.num(n);
                let head = scope.fun("a", vec![num]);
                Rule {
                    head: Head::Atom(head),
                    body: Vec::new(),
                    loc: scope.loc(),
                }
            };
            program.add(Statement::Rule(fact));
        }
        let rule = {
            let mut scope = grounder.rule_scope("t");
            let head = scope.id("c");
            let x = scope.local_var("X");
            let a_atom = scope.fun("a", vec![x.clone()]);
            let b_atom = scope.fun("b", vec![x]);
            Rule {
                head: Head::Atom(head),
                body: vec![BodyLiteral::Conditional(CondLiteral {
                    literal: Box::new(BodyLiteral::pred(a_atom)),
                    condition: vec![BodyLiteral::pred(b_atom)],
                })],
                loc: scope.loc(),
            }
        };
        program.add(Statement::Rule(rule));

        let mut out = RecordingEmitter::default();
        grounder.ground(&mut program, &mut out).unwrap();

        let c = grounder.store.id("c", false);
        let c_sig = grounder.store.sig(c).unwrap();
        conclusion.push(grounder.domains.uid(c_sig, c).is_some());
    }
    // With a(1) and a(2) the conjunction holds; with a(1) alone the
    // instance b(2) has no matching a(2).
    assert_eq!(conclusion, vec![true, false]);
}

/// Projection decouples a probed predicate from the enumerated one.
#[test]
fn projection_of_anonymous_slots() {
    let mut grounder = Grounder::from_config(Config::default());
    let mut program = grounder.program();

    // p(1,2). p(3,2).  q(X) :- p(_, X).
    for (u, v) in [(1, 2), (3, 2)] {
        let fact = {
            let mut scope = grounder.rule_scope("t");
            let u = scope.num(u);
            let v = scope.num(v);
            let head = scope.fun("p", vec![u, v]);
            Rule {
                head: Head::Atom(head),
                body: Vec::new(),
                loc: scope.loc(),
            }
        };
        program.add(Statement::Rule(fact));
    }
    let rule = {
        let mut scope = grounder.rule_scope("t");
        let x = scope.var("X");
        let anon = scope.var("_");
        let head = scope.fun("q", vec![x.clone()]);
        let p_atom = scope.fun("p", vec![anon, x]);
        Rule {
            head: Head::Atom(head),
            body: vec![BodyLiteral::pred(p_atom)],
            loc: scope.loc(),
        }
    };
    program.add(Statement::Rule(rule));

    let mut out = RecordingEmitter::default();
    grounder.ground(&mut program, &mut out).unwrap();

    // One q atom, via the projection predicate.
    let q = grounder.store.name("q");
    let two = grounder.store.num(2);
    let q2 = grounder.store.fun(q, vec![two], false);
    let q_sig = grounder.store.sig(q2).unwrap();
    assert!(grounder.domains.uid(q_sig, q2).is_some());
    assert_eq!(grounder.domains.domain(q_sig).unwrap().len(), 1);

    // The projection predicate exists and holds one atom.
    let projected = grounder.store.name("#p_p");
    let marker = grounder.store.id("#p", false);
    let probe = grounder.store.fun(projected, vec![marker, two], false);
    let probe_sig = grounder.store.sig(probe).unwrap();
    assert!(grounder.domains.uid(probe_sig, probe).is_some());
    assert_eq!(grounder.domains.domain(probe_sig).unwrap().len(), 1);
}
