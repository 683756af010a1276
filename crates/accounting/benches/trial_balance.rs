use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, NaiveDate, Utc};
use garments_accounting::{
    AccountType, ChartOfAccount, CreateJournalEntry, JournalCommand, JournalEntry, JournalEntryId,
    JournalLineInput, JournalType, NewAccount, TrialBalanceRequest, journal_query, trial_balance,
};
use garments_core::{Money, UserId, execute};

fn chart(count: usize) -> Vec<ChartOfAccount> {
    let now = Utc::now();
    let mut accounts = Vec::with_capacity(count);
    for i in 0..count {
        let account_type = AccountType::ALL[i % AccountType::ALL.len()];
        let input = NewAccount {
            code: Some(format!("{}{:04}", account_type.code_prefix(), i)),
            name: format!("Account {i}"),
            account_type,
            parent_id: None,
            description: None,
            opening_balance: Money::ZERO,
            category_group: None,
            sort_order: 0,
            allow_transactions: true,
            is_dynamic: false,
        };
        if let Ok(account) = ChartOfAccount::create(input, &accounts, now) {
            accounts.push(account);
        }
    }
    accounts
}

fn posted_entries(accounts: &[ChartOfAccount], count: usize) -> Vec<JournalEntry> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let user = UserId::new();
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let debit = &accounts[i % accounts.len()];
            let credit = &accounts[(i + 1) % accounts.len()];
            let amount = Money::from_minor(100 + i as i64);
            let id = JournalEntryId::new();
            let mut entry = JournalEntry::empty(id);
            let cmd = JournalCommand::Create(CreateJournalEntry {
                entry_id: id,
                journal_number: format!("JE-2024-01-{:04}", i + 1),
                transaction_date: start + Duration::days((i % 300) as i64),
                journal_type: JournalType::General,
                reference_number: format!("REF-{i}"),
                description: Some(format!("Entry {i}")),
                lines: vec![
                    JournalLineInput::debit(debit.id, amount, "dr"),
                    JournalLineInput::credit(credit.id, amount, "cr"),
                ],
                post_immediately: true,
                created_by: user,
                occurred_at: now,
            });
            execute(&mut entry, &cmd).unwrap();
            entry
        })
        .collect()
}

fn bench_trial_balance_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial_balance_generation");
    let accounts = chart(200);
    let request = TrialBalanceRequest::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    );

    for entry_count in [1_000usize, 10_000, 50_000] {
        let entries = posted_entries(&accounts, entry_count);
        group.throughput(Throughput::Elements(entry_count as u64));
        group.bench_with_input(BenchmarkId::new("grouped", entry_count), &entries, |b, entries| {
            b.iter(|| {
                let report = trial_balance::generate(black_box(&request), &accounts, entries, Utc::now()).unwrap();
                black_box(report.final_balance);
            });
        });
    }

    group.finish();
}

fn bench_journal_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_listing");
    let accounts = chart(50);
    let entries = posted_entries(&accounts, 10_000);
    let names = accounts.iter().map(|a| (a.id, a.name.clone())).collect();
    let filter = journal_query::JournalFilterParams::default().validate().unwrap();

    group.bench_function("first_page_with_summary", |b| {
        b.iter(|| {
            let listing = journal_query::list_entries(black_box(&entries), &names, &filter);
            black_box(listing.summary.total_entries);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_trial_balance_generation, bench_journal_listing);
criterion_main!(benches);
