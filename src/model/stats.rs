/// Row counters for one batch run.
#[derive(Debug, Default)]
pub struct Stats {
    n_transaction_rows: usize,
    n_candles: usize,
    n_grouped_entries: usize,
    n_ledger_entries: usize,
    n_buy_sells: usize,
    n_unpaired_lots: usize,
}

impl Stats {
    pub fn inc_transactions(&mut self) {
        self.n_transaction_rows += 1;
    }

    pub fn set_candles(&mut self, count: usize) {
        self.n_candles = count;
    }

    pub fn set_grouped_entries(&mut self, count: usize) {
        self.n_grouped_entries = count;
    }

    pub fn set_ledger_entries(&mut self, count: usize) {
        self.n_ledger_entries = count;
    }

    pub fn set_matched(&mut self, buy_sells: usize, unpaired: usize) {
        self.n_buy_sells = buy_sells;
        self.n_unpaired_lots = unpaired;
    }

    pub fn transactions(&self) -> usize {
        self.n_transaction_rows
    }

    pub fn pretty_print(&self) {
        println!("{self:#?}");
        println!();
    }
}
